//! Durable log and recovery for the backup coordinator
//!
//! The backup keeps an append-only operation log next to its slave fleet. The log is
//! replayed into a [`LocalStore`] on startup, appended on every write, and tailed by a
//! [`LogWatcher`] so records appended by another process become visible without a restart.

pub mod local_store;
pub mod oplog;
pub mod watcher;

pub use local_store::LocalStore;
pub use oplog::{LogRecord, OpLog, ReplayStats};
pub use watcher::LogWatcher;

//! Common utilities and types shared across quorumkv

pub mod config;
pub mod error;
pub mod protocol;
pub mod utils;

pub use config::{Config, CoordinatorConfig, CoordinatorRole, SlaveConfig};
pub use error::{Error, Result};
pub use protocol::{PeerRole, Request};
pub use utils::{next_backoff, parse_duration};

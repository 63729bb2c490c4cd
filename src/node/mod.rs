//! Storage slave
//!
//! A slave keeps key/value pairs in memory and answers the READ and WRITE requests its
//! coordinator forwards. It stays attached to the first coordinator it can reach and moves
//! down its coordinator list when that one goes away.

pub mod server;
pub mod store;

pub use server::SlaveNode;
pub use store::SlaveStore;

//! # quorumkv
//!
//! A small replicated key-value store with:
//! - A primary coordinator and a backup coordinator sharing one text protocol
//! - Writes replicated to a random quorum of storage slaves
//! - Reads served from a key routing table, or by broadcast and majority vote
//! - A durable operation log on the backup, replayed on start and tailed while running
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!  clients ──CLIENT──┐            ┌──CLIENT── clients
//!                    ▼            ▼
//!          ┌──────────────┐  ┌──────────────┐
//!          │   Primary    │  │    Backup    │
//!          │ coordinator  │  │ coordinator  │
//!          │   :12345     │  │   :12346     │
//!          │              │  │  + op log    │
//!          └──────┬───────┘  └──────┬───────┘
//!                 │ SLAVE           │ SLAVE
//!        ┌────────┼────────┐        │
//!        ▼        ▼        ▼        ▼
//!     slave 1  slave 2  slave 3   slave 4
//! ```
//!
//! ## Usage
//!
//! ### Start the coordinators
//! ```bash
//! quorumkv-coord --role primary
//! quorumkv-coord --role backup --log-path ./kv_store.log
//! ```
//!
//! ### Start slaves
//! ```bash
//! quorumkv-slave --coordinators 127.0.0.1:12345,127.0.0.1:12346
//! ```
//!
//! ### Use the CLI
//! ```bash
//! quorumkv write color blue
//! quorumkv read color
//! ```

pub mod backup;
pub mod client;
pub mod common;
pub mod coordinator;
pub mod node;

// Re-export commonly used types
pub use client::KvClient;
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use node::SlaveNode;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

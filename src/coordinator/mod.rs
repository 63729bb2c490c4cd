//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Accepting clients, slaves and peer coordinators on one port
//! - Tracking live slaves and which slaves hold each key
//! - Replicating writes to a random quorum
//! - Resolving reads by routing or by majority vote

pub mod quorum;
pub mod registry;
pub mod resolver;
pub mod routing;
pub mod server;
pub mod session;
pub mod slave;
pub mod state;

pub use resolver::ReadOutcome;
pub use server::Coordinator;
pub use state::ClusterState;

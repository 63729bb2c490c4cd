//! Quorum selection and write fan-out
//!
//! A write goes to `ceil((live + 1) / 2)` distinct slaves picked uniformly at random, where
//! the coordinator counts as one of the `live + 1` voters. Replication is best-effort: the
//! write succeeds whatever the number of acknowledgments, and every selected slave that
//! misses its deadline is dropped from the cluster.

use crate::common::protocol;
use crate::coordinator::slave::{SlaveHandle, SlaveId};
use futures_util::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Number of slaves targeted by a write when `live` slaves are attached.
pub fn quorum_size(live: usize) -> usize {
    (live + 2) / 2
}

/// Pick `min(live, quorum_size(live))` distinct members of `live` at random.
pub fn select_quorum<T: Clone, R: Rng + ?Sized>(live: &[T], rng: &mut R) -> Vec<T> {
    let amount = quorum_size(live.len()).min(live.len());
    rand::seq::index::sample(rng, live.len(), amount)
        .into_iter()
        .map(|index| live[index].clone())
        .collect()
}

/// Result of replicating one write
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Slaves chosen for the key, in routing order
    pub selected: Vec<SlaveId>,
    pub acknowledged: Vec<SlaveId>,
    /// Selected slaves that failed to acknowledge and were dropped
    pub failed: Vec<SlaveId>,
}

impl WriteOutcome {
    pub fn fully_acknowledged(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Send `request` to every selected slave concurrently and sort them by outcome.
///
/// Each send has its own deadline. Any reply counts as an acknowledgment; a reply that does
/// not look like one is logged but not held against the slave.
pub async fn replicate(
    key: &str,
    request: &str,
    selected: &[Arc<SlaveHandle>],
    deadline: Duration,
) -> (Vec<Arc<SlaveHandle>>, Vec<Arc<SlaveHandle>>) {
    let sends = selected.iter().map(|slave| async move {
        let result = slave.request(request, deadline).await;
        (slave, result)
    });

    let mut acked = Vec::with_capacity(selected.len());
    let mut failed = Vec::new();
    for (slave, result) in join_all(sends).await {
        match result {
            Ok(reply) => {
                if !protocol::is_ack_for(&reply, key) {
                    tracing::debug!(slave = slave.id(), "unexpected write reply: {}", reply);
                }
                acked.push(slave.clone());
            }
            Err(e) => {
                tracing::warn!(slave = slave.id(), addr = %slave.addr(), key, "no acknowledgment: {}", e);
                failed.push(slave.clone());
            }
        }
    }
    (acked, failed)
}

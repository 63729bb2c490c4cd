//! Read resolution: routed lookup, or broadcast and majority vote

use crate::common::protocol;
use crate::coordinator::slave::{SlaveHandle, SlaveId};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// How a read was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Served from the backup's recovered store, no slave contacted
    Local(String),
    /// First answer from a slave recorded in the routing table
    Routed { slave: SlaveId, response: String },
    /// Most frequent answer among all slaves that knew the key
    Majority {
        response: String,
        votes: usize,
        holders: Vec<SlaveId>,
    },
    NotFound,
}

impl ReadOutcome {
    /// The line sent back to the client
    pub fn into_response(self) -> String {
        match self {
            ReadOutcome::Local(line) => line,
            ReadOutcome::Routed { response, .. } => response,
            ReadOutcome::Majority { response, .. } => response,
            ReadOutcome::NotFound => protocol::NOT_FOUND.to_string(),
        }
    }
}

/// Most frequent response; ties go to the response seen first in `responses`.
pub fn majority_response<S: AsRef<str>>(responses: &[S]) -> Option<(&str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for response in responses {
        *counts.entry(response.as_ref()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for response in responses {
        let response = response.as_ref();
        let count = counts[response];
        if best.map_or(true, |(_, max)| count > max) {
            best = Some((response, count));
        }
    }
    best
}

/// Try the recorded holders in order and return the first reply.
///
/// Holders that fail are returned in the second slot so the caller can forget them.
pub async fn routed_read(
    request: &str,
    holders: &[Arc<SlaveHandle>],
    deadline: Duration,
) -> (Option<(SlaveId, String)>, Vec<SlaveId>) {
    let mut failed = Vec::new();
    for slave in holders {
        match slave.request(request, deadline).await {
            Ok(reply) => return (Some((slave.id(), reply)), failed),
            Err(e) => {
                tracing::debug!(slave = slave.id(), "routed read failed: {}", e);
                failed.push(slave.id());
            }
        }
    }
    (None, failed)
}

/// Ask every slave concurrently and keep the replies that know the key.
///
/// Replies come back in the order of `slaves`, which makes the majority tie-break
/// follow registration order.
pub async fn broadcast_read(
    key: &str,
    request: &str,
    slaves: &[Arc<SlaveHandle>],
    deadline: Duration,
) -> Vec<(Arc<SlaveHandle>, String)> {
    let miss = protocol::not_found_for(key);
    let asks = slaves.iter().map(|slave| async move {
        let result = slave.request(request, deadline).await;
        (slave, result)
    });

    join_all(asks)
        .await
        .into_iter()
        .filter_map(|(slave, result)| match result {
            Ok(reply) if reply != miss => Some((slave.clone(), reply)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(slave = slave.id(), "broadcast read failed: {}", e);
                None
            }
        })
        .collect()
}

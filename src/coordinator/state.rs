//! Shared coordinator state and the write/read paths
//!
//! One [`ClusterState`] per coordinator process, shared by every connection task. The
//! registry, routing table and local store each have their own lock and none of them is held
//! while waiting on a slave.

use crate::backup::LocalStore;
use crate::common::protocol::{self, Request};
use crate::common::CoordinatorConfig;
use crate::coordinator::quorum::{self, WriteOutcome};
use crate::coordinator::registry::SlaveRegistry;
use crate::coordinator::resolver::{self, ReadOutcome};
use crate::coordinator::routing::RoutingTable;
use crate::coordinator::slave::{SlaveHandle, SlaveId};
use std::sync::Arc;
use std::time::Duration;

pub struct ClusterState {
    registry: SlaveRegistry,
    routing: RoutingTable,
    /// Present on the backup coordinator only
    local: Option<Arc<LocalStore>>,
    slave_timeout: Duration,
}

impl ClusterState {
    pub fn new(config: &CoordinatorConfig, local: Option<Arc<LocalStore>>) -> Self {
        Self::with_timeout(config.slave_timeout(), local)
    }

    pub fn with_timeout(slave_timeout: Duration, local: Option<Arc<LocalStore>>) -> Self {
        Self {
            registry: SlaveRegistry::new(),
            routing: RoutingTable::new(),
            local,
            slave_timeout,
        }
    }

    pub fn registry(&self) -> &SlaveRegistry {
        &self.registry
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn local_store(&self) -> Option<&Arc<LocalStore>> {
        self.local.as_ref()
    }

    pub fn register_slave(&self, slave: Arc<SlaveHandle>) {
        let (id, addr) = (slave.id(), slave.addr().to_string());
        if self.registry.register(slave) {
            tracing::info!(slave = id, addr = %addr, live = self.registry.len(), "slave attached");
        }
    }

    pub fn remove_slave(&self, slave: SlaveId) -> bool {
        self.registry.remove(slave, &self.routing).is_some()
    }

    /// Replicate a write to a fresh random quorum.
    ///
    /// Always succeeds from the client's point of view. Selected slaves that fail to
    /// acknowledge are removed from the cluster before this returns.
    pub async fn write(&self, key: &str, value: &str) -> WriteOutcome {
        let live = self.registry.snapshot();
        let selected = quorum::select_quorum(&live, &mut rand::thread_rng());
        drop(live);

        tracing::debug!(
            key,
            live = self.registry.len(),
            quorum = selected.len(),
            "selected write quorum"
        );
        self.routing.assign(key, selected.clone());

        if let Some(local) = &self.local {
            if let Err(e) = local.record_write(key, value).await {
                tracing::error!(key, "write not persisted to operation log: {}", e);
            }
        }

        let mut outcome = WriteOutcome {
            selected: selected.iter().map(|s| s.id()).collect(),
            ..Default::default()
        };
        if selected.is_empty() {
            tracing::info!(key, "no slaves attached, write kept locally only");
            return outcome;
        }

        let request = Request::Write {
            key: key.to_string(),
            value: value.to_string(),
        }
        .encode();
        let (acked, failed) = quorum::replicate(key, &request, &selected, self.slave_timeout).await;

        outcome.acknowledged = acked.iter().map(|s| s.id()).collect();
        outcome.failed = failed.iter().map(|s| s.id()).collect();
        for slave in failed {
            self.remove_slave(slave.id());
        }

        tracing::info!(
            key,
            acknowledged = outcome.acknowledged.len(),
            failed = outcome.failed.len(),
            "write replicated"
        );
        outcome
    }

    /// Resolve a read: local store, then routed holders, then broadcast and majority vote.
    pub async fn read(&self, key: &str) -> ReadOutcome {
        if let Some(value) = self.local.as_ref().and_then(|local| local.get(key)) {
            tracing::debug!(key, "read served from local store");
            return ReadOutcome::Local(protocol::value_line(key, &value));
        }

        let request = Request::Read {
            key: key.to_string(),
        }
        .encode();

        if let Some(holders) = self.routing.holders(key) {
            let (answer, failed) = resolver::routed_read(&request, &holders, self.slave_timeout).await;
            for slave in failed {
                self.routing.forget(key, slave);
            }
            return match answer {
                Some((slave, response)) => {
                    tracing::debug!(key, slave, "read served by routed slave");
                    ReadOutcome::Routed { slave, response }
                }
                None => {
                    tracing::info!(key, tried = holders.len(), "every routed holder failed");
                    ReadOutcome::NotFound
                }
            };
        }

        let live = self.registry.snapshot();
        tracing::debug!(key, live = live.len(), "no route for key, broadcasting read");
        let found = resolver::broadcast_read(key, &request, &live, self.slave_timeout).await;
        drop(live);

        let responses: Vec<&str> = found.iter().map(|(_, response)| response.as_str()).collect();
        let Some((winner, votes)) = resolver::majority_response(&responses) else {
            return ReadOutcome::NotFound;
        };
        let response = winner.to_string();

        let holders: Vec<Arc<SlaveHandle>> = found.iter().map(|(slave, _)| slave.clone()).collect();
        let holder_ids = holders.iter().map(|s| s.id()).collect();
        self.routing.assign(key, holders);

        tracing::info!(key, votes, answers = found.len(), "read resolved by majority");
        ReadOutcome::Majority {
            response,
            votes,
            holders: holder_ids,
        }
    }
}

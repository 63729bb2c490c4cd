//! Registry of live slave connections
//!
//! Lock order is always registry, then routing table. Nothing holds either lock across a
//! network call: fan-out works on a [`SlaveRegistry::snapshot`].

use crate::coordinator::routing::RoutingTable;
use crate::coordinator::slave::{SlaveHandle, SlaveId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct SlaveRegistry {
    slaves: Mutex<Vec<Arc<SlaveHandle>>>,
}

impl SlaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<SlaveHandle>>> {
        self.slaves.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a slave. Returns false if this connection is already registered.
    pub fn register(&self, slave: Arc<SlaveHandle>) -> bool {
        let mut slaves = self.lock();
        if slaves.iter().any(|s| s.id() == slave.id()) {
            return false;
        }
        slaves.push(slave);
        true
    }

    /// Remove a slave from the registry and from every routing entry naming it.
    ///
    /// The registry lock is held while the routing table is pruned, so no caller observes
    /// the slave gone from one but not the other. Returns the removed handle, if it was live.
    pub fn remove(&self, slave: SlaveId, routing: &RoutingTable) -> Option<Arc<SlaveHandle>> {
        let mut slaves = self.lock();
        let removed = slaves
            .iter()
            .position(|s| s.id() == slave)
            .map(|index| slaves.remove(index));
        let pruned = routing.prune(slave);
        drop(slaves);

        if let Some(handle) = &removed {
            tracing::info!(
                slave = slave,
                addr = %handle.addr(),
                routes_pruned = pruned,
                "slave removed"
            );
        }
        removed
    }

    /// Copy of the live slaves in registration order
    pub fn snapshot(&self) -> Vec<Arc<SlaveHandle>> {
        self.lock().clone()
    }

    pub fn ids(&self) -> Vec<SlaveId> {
        self.lock().iter().map(|s| s.id()).collect()
    }

    pub fn contains(&self, slave: SlaveId) -> bool {
        self.lock().iter().any(|s| s.id() == slave)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

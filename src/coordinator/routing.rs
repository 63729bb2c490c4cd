//! Key routing table: which slaves were last known to hold a key
//!
//! Entries are advisory. A missing entry only means the coordinator has to broadcast; an
//! entry may still name a slave that has since been dropped, in which case the request to
//! it simply fails.

use crate::coordinator::slave::{SlaveHandle, SlaveId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Mutex<HashMap<String, Vec<Arc<SlaveHandle>>>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Arc<SlaveHandle>>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the holders of `key`. An empty holder list removes the entry.
    pub fn assign(&self, key: &str, holders: Vec<Arc<SlaveHandle>>) {
        let mut routes = self.lock();
        if holders.is_empty() {
            routes.remove(key);
        } else {
            routes.insert(key.to_string(), holders);
        }
    }

    /// Copy of the holders recorded for `key`, in the order they were recorded
    pub fn holders(&self, key: &str) -> Option<Vec<Arc<SlaveHandle>>> {
        self.lock().get(key).cloned()
    }

    pub fn holder_ids(&self, key: &str) -> Option<Vec<SlaveId>> {
        self.lock()
            .get(key)
            .map(|holders| holders.iter().map(|s| s.id()).collect())
    }

    /// Drop one holder from one key, e.g. after a routed read to it failed.
    pub fn forget(&self, key: &str, slave: SlaveId) {
        let mut routes = self.lock();
        if let Some(holders) = routes.get_mut(key) {
            holders.retain(|s| s.id() != slave);
            if holders.is_empty() {
                routes.remove(key);
            }
        }
    }

    /// Remove `slave` from every entry. Returns how many entries referenced it.
    ///
    /// Only [`SlaveRegistry::remove`](crate::coordinator::registry::SlaveRegistry::remove)
    /// calls this, while holding the registry lock.
    pub(crate) fn prune(&self, slave: SlaveId) -> usize {
        let mut routes = self.lock();
        let mut touched = 0;
        routes.retain(|_, holders| {
            let before = holders.len();
            holders.retain(|s| s.id() != slave);
            if holders.len() != before {
                touched += 1;
            }
            !holders.is_empty()
        });
        touched
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

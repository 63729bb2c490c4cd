//! The backup coordinator's own copy of written data
//!
//! Rebuilt from the operation log at startup, updated on every write and by the log watcher.
//! Reads consult it before any slave.

use crate::backup::oplog::{LogRecord, OpLog, ReplayStats};
use crate::common::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct LocalStore {
    data: Mutex<HashMap<String, String>>,
    log: Option<Arc<OpLog>>,
    /// Held across a local append plus its apply, and across a whole watcher batch, so a
    /// batch never applies an older line over a newer local write.
    log_order: tokio::sync::Mutex<()>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LocalStore {
    /// A store with no backing log
    pub fn in_memory() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            log: None,
            log_order: tokio::sync::Mutex::new(()),
        }
    }

    /// Open the log at `path`, replay it, and keep it open for appends.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, ReplayStats)> {
        let path = path.as_ref();
        let log = OpLog::open(path)?;

        let mut data = HashMap::new();
        let stats = OpLog::replay(path, |record| {
            data.insert(record.key, record.value);
        })?;

        tracing::info!(
            path = %path.display(),
            applied = stats.applied,
            malformed = stats.malformed,
            keys = data.len(),
            "replayed operation log"
        );

        Ok((
            Self {
                data: Mutex::new(data),
                log: Some(Arc::new(log)),
                log_order: tokio::sync::Mutex::new(()),
            },
            stats,
        ))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Merge a record read from the log.
    pub fn apply(&self, record: LogRecord) {
        self.lock().insert(record.key, record.value);
    }

    /// Persist a client write to the log, then make it visible.
    ///
    /// The value is stored even when the log append fails; the error is returned so the
    /// caller can report the lost durability.
    pub async fn record_write(&self, key: &str, value: &str) -> Result<()> {
        let record = LogRecord::write(key, value);
        let _order = self.log_order.lock().await;

        let logged = match &self.log {
            Some(log) => {
                let log = Arc::clone(log);
                let pending = record.clone();
                tokio::task::spawn_blocking(move || log.append(&pending))
                    .await
                    .map_err(|e| Error::Log(format!("log append task failed: {}", e)))
                    .and_then(|appended| appended)
            }
            None => Ok(()),
        };

        self.apply(record);
        logged
    }

    /// Apply every complete line of the log at `path` after `offset`.
    pub async fn merge_from(self: &Arc<Self>, path: PathBuf, offset: u64) -> Result<ReplayStats> {
        let _order = self.log_order.lock().await;
        let store = Arc::clone(self);

        tokio::task::spawn_blocking(move || {
            OpLog::read_from(&path, offset, |record| {
                tracing::debug!(key = %record.key, "merged from log");
                store.apply(record);
            })
        })
        .await
        .map_err(|e| Error::Log(format!("log merge task failed: {}", e)))?
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_deref().map(OpLog::path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Background tailer for the operation log
//!
//! Polls the log's size on a fixed interval and merges any newly appended lines into the
//! [`LocalStore`]. This is how the backup sees records written by another process.

use crate::backup::local_store::LocalStore;
use crate::backup::oplog::ReplayStats;
use crate::common::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct LogWatcher {
    path: PathBuf,
    store: Arc<LocalStore>,
    interval: Duration,
    offset: u64,
}

impl LogWatcher {
    /// Watch `path`, starting after the first `offset` bytes (usually what replay consumed).
    pub fn new(path: impl Into<PathBuf>, store: Arc<LocalStore>, interval: Duration, offset: u64) -> Self {
        Self {
            path: path.into(),
            store,
            interval,
            offset,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read whatever was appended since the last poll.
    pub async fn poll_once(&mut self) -> Result<ReplayStats> {
        let stats = self.store.merge_from(self.path.clone(), self.offset).await?;

        if stats.truncated {
            tracing::warn!(path = %self.path.display(), "operation log shrank, re-reading from start");
        }
        if stats.applied > 0 || stats.malformed > 0 {
            tracing::info!(
                applied = stats.applied,
                malformed = stats.malformed,
                offset = stats.offset,
                "merged appended log records"
            );
        }
        self.offset = stats.offset;
        Ok(stats)
    }

    /// Poll forever on the configured interval.
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.poll_once().await {
                    tracing::warn!(path = %self.path.display(), "log watcher poll failed: {}", e);
                }
            }
        })
    }
}

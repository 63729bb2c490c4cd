//! Coordinator server

use crate::backup::{LocalStore, LogWatcher};
use crate::common::{CoordinatorConfig, Result};
use crate::coordinator::session::{handle_connection, SessionLimits};
use crate::coordinator::state::ClusterState;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Coordinator {
    config: CoordinatorConfig,
    state: Arc<ClusterState>,
    watcher: Option<LogWatcher>,
}

impl Coordinator {
    /// Build the coordinator for its configured role.
    ///
    /// A backup replays its operation log before it accepts anything.
    pub fn open(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;

        let (local, watcher) = if config.role.is_backup() {
            let (store, stats) = LocalStore::open(&config.log_path)?;
            let store = Arc::new(store);
            let watcher = LogWatcher::new(
                &config.log_path,
                store.clone(),
                config.watch_interval(),
                stats.offset,
            );
            (Some(store), Some(watcher))
        } else {
            (None, None)
        };

        let state = Arc::new(ClusterState::new(&config, local));
        Ok(Self {
            config,
            state,
            watcher,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<ClusterState> {
        self.state.clone()
    }

    /// Bind the configured address and serve until the process stops.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        tracing::info!("Starting {} coordinator", self.config.role);
        tracing::info!("  Listening on: {}", listener.local_addr()?);
        tracing::info!("  Slave timeout: {:?}", self.config.slave_timeout());
        if let Some(local) = self.state.local_store() {
            tracing::info!("  Operation log: {}", self.config.log_path.display());
            tracing::info!("  Recovered keys: {}", local.len());
        }

        let watcher = self.watcher.map(LogWatcher::start);
        let limits = SessionLimits::from(&self.config);

        let result = accept_loop(listener, self.state, limits).await;
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        result
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<ClusterState>, limits: SessionLimits) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("accept failed: {}", e);
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, "set_nodelay failed: {}", e);
        }

        let state = state.clone();
        tokio::spawn(async move {
            match handle_connection(stream, peer.to_string(), state, limits).await {
                Ok(()) => {}
                Err(e) if e.is_disconnect() => tracing::debug!(peer = %peer, "connection dropped: {}", e),
                Err(e) => tracing::warn!(peer = %peer, "connection ended: {}", e),
            }
        });
    }
}

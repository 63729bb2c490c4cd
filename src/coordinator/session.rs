//! Per-connection handling: handshake, then a client or slave session

use crate::common::protocol::{self, ParseError, PeerRole, Request, INVALID_COMMAND, WRITE_DONE};
use crate::common::{CoordinatorConfig, Error, Result};
use crate::coordinator::slave::{self, SessionEnd};
use crate::coordinator::state::ClusterState;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec};

/// Timeouts applied to an accepted connection
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Deadline for the handshake and for each reply written to a client
    pub io_timeout: Duration,
    /// A client that sends nothing for this long is disconnected
    pub idle_timeout: Duration,
}

impl From<&CoordinatorConfig> for SessionLimits {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            io_timeout: config.client_timeout(),
            idle_timeout: config.client_idle_timeout(),
        }
    }
}

/// Read the handshake and hand the connection to the matching session.
pub async fn handle_connection<S>(
    stream: S,
    peer: String,
    state: Arc<ClusterState>,
    limits: SessionLimits,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, protocol::codec());

    let hello = match tokio::time::timeout(limits.io_timeout, framed.next()).await {
        Ok(Some(line)) => line?,
        Ok(None) => return Ok(()),
        Err(_) => return Err(Error::Timeout(format!("no handshake from {}", peer))),
    };

    match PeerRole::parse(&hello) {
        Some(PeerRole::Client) => {
            tracing::debug!(peer = %peer, "client connected");
            serve_client(framed, &peer, &state, limits).await
        }
        Some(PeerRole::Slave) => {
            serve_slave(framed, peer, &state).await;
            Ok(())
        }
        Some(role @ (PeerRole::Master | PeerRole::Backup)) => {
            tracing::info!(peer = %peer, role = %role, "coordinator peer connected, nothing to exchange");
            drain(framed).await
        }
        None => {
            tracing::warn!(peer = %peer, "unrecognized handshake: {:?}", hello);
            Ok(())
        }
    }
}

async fn serve_client<S>(
    mut framed: Framed<S, LinesCodec>,
    peer: &str,
    state: &ClusterState,
    limits: SessionLimits,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let line = match tokio::time::timeout(limits.idle_timeout, framed.next()).await {
            Ok(Some(line)) => line?,
            Ok(None) => {
                tracing::debug!(peer, "client disconnected");
                return Ok(());
            }
            Err(_) => {
                tracing::info!(peer, "closing idle client");
                return Ok(());
            }
        };

        let reply = match Request::parse(&line) {
            Ok(Request::Write { key, value }) => {
                state.write(&key, &value).await;
                WRITE_DONE.to_string()
            }
            Ok(Request::Read { key }) => state.read(&key).await.into_response(),
            Err(ParseError::Incomplete) => {
                tracing::debug!(peer, "dropping incomplete command: {:?}", line);
                continue;
            }
            Err(ParseError::Invalid) => {
                tracing::debug!(peer, "invalid command: {:?}", line);
                INVALID_COMMAND.to_string()
            }
        };

        tokio::time::timeout(limits.io_timeout, framed.send(reply))
            .await
            .map_err(|_| Error::Timeout(format!("reply to {}", peer)))??;
    }
}

/// Register the slave and keep it attached until its session ends.
async fn serve_slave<S>(framed: Framed<S, LinesCodec>, peer: String, state: &ClusterState)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (handle, session) = slave::attach(framed, peer.clone());
    let id = handle.id();
    state.register_slave(handle);

    match session.run().await {
        SessionEnd::Closed => tracing::info!(slave = id, peer = %peer, "slave disconnected"),
        SessionEnd::Detached => tracing::debug!(slave = id, peer = %peer, "slave released"),
        SessionEnd::Failed(e) => tracing::warn!(slave = id, peer = %peer, "slave session failed: {}", e),
    }
    state.remove_slave(id);
}

async fn drain<S>(mut framed: Framed<S, LinesCodec>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(line) = framed.next().await {
        line?;
    }
    Ok(())
}

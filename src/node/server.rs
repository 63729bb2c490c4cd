//! Slave node: connect, serve the coordinator, reconnect

use crate::common::protocol::{self, PeerRole, PING};
use crate::common::{next_backoff, Error, Result, SlaveConfig};
use crate::node::store::SlaveStore;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

/// Pause between the end of one session and the next connection attempt
const SESSION_PAUSE: Duration = Duration::from_secs(1);

pub struct SlaveNode {
    config: SlaveConfig,
    store: SlaveStore,
}

impl SlaveNode {
    pub fn new(config: SlaveConfig) -> Self {
        Self {
            config,
            store: SlaveStore::new(),
        }
    }

    pub fn store(&self) -> &SlaveStore {
        &self.store
    }

    /// Connect to the first reachable coordinator and announce this node as a slave.
    pub async fn connect(&self) -> Result<(Framed<TcpStream, LinesCodec>, String)> {
        for addr in &self.config.coordinators {
            let stream = match tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::debug!(addr = %addr, "coordinator unreachable: {}", e);
                    continue;
                }
                Err(_) => {
                    tracing::debug!(addr = %addr, "connect timed out");
                    continue;
                }
            };

            let mut framed = Framed::new(stream, protocol::codec());
            match framed.send(PeerRole::Slave.as_str()).await {
                Ok(()) => return Ok((framed, addr.clone())),
                Err(e) => tracing::debug!(addr = %addr, "handshake failed: {}", e),
            }
        }

        Err(Error::NoCoordinator(self.config.coordinators.join(", ")))
    }

    /// Answer the coordinator until it hangs up.
    ///
    /// Sends `PING` whenever nothing arrives for the idle period.
    pub async fn serve_session<S>(&mut self, mut framed: Framed<S, LinesCodec>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let idle = self.config.idle_timeout();
        let reply_timeout = self.config.reply_timeout();

        loop {
            let line = match tokio::time::timeout(idle, framed.next()).await {
                Ok(Some(line)) => line?,
                Ok(None) => return Ok(()),
                Err(_) => {
                    tracing::debug!("idle, pinging coordinator");
                    tokio::time::timeout(reply_timeout, framed.send(PING))
                        .await
                        .map_err(|_| Error::Timeout("ping".into()))??;
                    continue;
                }
            };

            let Some(reply) = self.store.handle_line(&line) else {
                continue;
            };
            tracing::debug!("{} -> {}", line, reply);
            tokio::time::timeout(reply_timeout, framed.send(reply))
                .await
                .map_err(|_| Error::Timeout("reply to coordinator".into()))??;
        }
    }

    /// Connect, serve, and reconnect forever.
    pub async fn run(mut self) {
        let base = self.config.base_backoff();
        let max = self.config.max_backoff();
        let mut delay = base;

        loop {
            let (framed, addr) = match self.connect().await {
                Ok(connected) => connected,
                Err(e) => {
                    tracing::warn!("{}; retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    delay = next_backoff(delay, max);
                    continue;
                }
            };

            delay = base;
            tracing::info!(coordinator = %addr, keys = self.store.len(), "attached to coordinator");
            match self.serve_session(framed).await {
                Ok(()) => tracing::info!(coordinator = %addr, "session ended"),
                Err(e) => tracing::warn!(coordinator = %addr, "session ended with error: {}", e),
            }
            tokio::time::sleep(SESSION_PAUSE).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::slave::framed;
    use tokio::io::duplex;
    use tokio::net::TcpListener;

    fn config(coordinators: Vec<String>) -> SlaveConfig {
        SlaveConfig {
            coordinators,
            connect_timeout_ms: 500,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_session_answers_and_keeps_data() {
        let mut node = SlaveNode::new(config(vec![]));

        let (ours, theirs) = duplex(1024);
        let coordinator = tokio::spawn(async move {
            let mut coord = framed(ours);
            coord.send("WRITE k v").await.unwrap();
            let ack = coord.next().await.unwrap().unwrap();
            coord.send("READ k").await.unwrap();
            let value = coord.next().await.unwrap().unwrap();
            (ack, value)
        });

        node.serve_session(framed(theirs)).await.unwrap();
        let (ack, value) = coordinator.await.unwrap();
        assert_eq!(ack, "k v ACK");
        assert_eq!(value, "k v");

        // Data outlives the session
        assert_eq!(node.store().get("k"), Some("v"));
    }

    #[tokio::test]
    async fn test_idle_session_pings() {
        let mut node = SlaveNode::new(SlaveConfig {
            idle_timeout_ms: 20,
            ..config(vec![])
        });

        let (ours, theirs) = duplex(1024);
        let coordinator = tokio::spawn(async move {
            let mut coord = framed(ours);
            coord.next().await.unwrap().unwrap()
        });

        let session = tokio::spawn(async move { node.serve_session(framed(theirs)).await });
        assert_eq!(coordinator.await.unwrap(), "PING");
        session.abort();
    }

    #[tokio::test]
    async fn test_connect_skips_dead_coordinator() {
        // Grab a free port and release it so nothing listens there
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap().to_string();
        drop(dead);

        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_addr = live.local_addr().unwrap().to_string();

        let node = SlaveNode::new(config(vec![dead_addr, live_addr.clone()]));
        let (accepted, connected) = tokio::join!(live.accept(), node.connect());

        let (_framed, addr) = connected.unwrap();
        assert_eq!(addr, live_addr);

        let mut coord = framed(accepted.unwrap().0);
        assert_eq!(coord.next().await.unwrap().unwrap(), "SLAVE");
    }

    #[tokio::test]
    async fn test_connect_fails_without_coordinators() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap().to_string();
        drop(dead);

        let node = SlaveNode::new(config(vec![dead_addr]));
        assert!(matches!(node.connect().await, Err(Error::NoCoordinator(_))));
    }
}

//! Coordinator-side connection to an attached storage slave
//!
//! A slave connection is owned by a single [`SlaveSession`] task. Everything else talks to it
//! through a cloneable [`SlaveHandle`]: requests are queued on a channel and the session
//! multiplexes them with the inbound drain that detects disconnection. Exchanges on one
//! connection are strictly sequential, so a reply can never be paired with the wrong request.

use crate::common::protocol::{self, PING};
use crate::common::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LinesCodec};

/// Process-unique identity of one slave connection
pub type SlaveId = u64;

static NEXT_SLAVE_ID: AtomicU64 = AtomicU64::new(1);

const REQUEST_QUEUE_DEPTH: usize = 32;

struct Exchange {
    line: String,
    deadline: Duration,
    reply: oneshot::Sender<Result<String>>,
}

/// Handle used to send requests to an attached slave.
///
/// The session stops once every handle has been dropped, which closes the connection.
#[derive(Debug)]
pub struct SlaveHandle {
    id: SlaveId,
    addr: String,
    tx: mpsc::Sender<Exchange>,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange").field("line", &self.line).finish()
    }
}

impl SlaveHandle {
    pub fn id(&self) -> SlaveId {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one request line and wait for the slave's reply.
    ///
    /// `deadline` bounds the whole call, including time spent queued behind other requests.
    pub async fn request(&self, line: &str, deadline: Duration) -> Result<String> {
        let (reply, response) = oneshot::channel();
        let exchange = Exchange {
            line: line.to_string(),
            deadline,
            reply,
        };

        let round_trip = async {
            self.tx
                .send(exchange)
                .await
                .map_err(|_| Error::SlaveGone(self.id))?;
            response.await.map_err(|_| Error::SlaveGone(self.id))?
        };

        tokio::time::timeout(deadline, round_trip)
            .await
            .map_err(|_| Error::Timeout(format!("slave {} ({})", self.id, self.addr)))?
    }
}

/// Why a slave session stopped
#[derive(Debug)]
pub enum SessionEnd {
    /// The slave closed the connection
    Closed,
    /// Every handle was dropped; the coordinator let go of the slave
    Detached,
    /// An exchange or the drain failed
    Failed(Error),
}

/// The task that owns a slave connection
pub struct SlaveSession<S> {
    id: SlaveId,
    addr: String,
    framed: Framed<S, LinesCodec>,
    rx: mpsc::Receiver<Exchange>,
}

/// Wrap an already-handshaken slave connection.
pub fn attach<S>(framed: Framed<S, LinesCodec>, addr: impl Into<String>) -> (Arc<SlaveHandle>, SlaveSession<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = NEXT_SLAVE_ID.fetch_add(1, Ordering::Relaxed);
    let addr = addr.into();
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let handle = Arc::new(SlaveHandle {
        id,
        addr: addr.clone(),
        tx,
    });
    let session = SlaveSession {
        id,
        addr,
        framed,
        rx,
    };
    (handle, session)
}

impl<S> SlaveSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Serve queued requests and drain unsolicited traffic until the connection ends.
    pub async fn run(mut self) -> SessionEnd {
        loop {
            tokio::select! {
                queued = self.rx.recv() => {
                    let Some(exchange) = queued else {
                        return SessionEnd::Detached;
                    };
                    let result = exchange_line(&mut self.framed, &self.addr, &exchange.line, exchange.deadline).await;
                    match result {
                        Ok(reply) => {
                            let _ = exchange.reply.send(Ok(reply));
                        }
                        Err(e) => {
                            // The connection is out of step with its requests after a failed exchange.
                            tracing::warn!(slave = self.id, addr = %self.addr, "exchange failed: {}", e);
                            let _ = exchange.reply.send(Err(peer_failure(&e)));
                            return SessionEnd::Failed(e);
                        }
                    }
                }
                inbound = self.framed.next() => match inbound {
                    Some(Ok(line)) => {
                        tracing::debug!(slave = self.id, addr = %self.addr, "discarding unsolicited message: {}", line);
                    }
                    Some(Err(e)) => return SessionEnd::Failed(e.into()),
                    None => return SessionEnd::Closed,
                },
            }
        }
    }
}

async fn exchange_line<S>(
    framed: &mut Framed<S, LinesCodec>,
    addr: &str,
    line: &str,
    deadline: Duration,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let round_trip = async {
        framed.send(line).await?;
        loop {
            match framed.next().await {
                Some(Ok(reply)) if reply.trim_end() == PING => continue,
                Some(Ok(reply)) => return Ok(reply.trim_end().to_string()),
                Some(Err(e)) => return Err(Error::from(e)),
                None => return Err(Error::ConnectionClosed(addr.to_string())),
            }
        }
    };

    tokio::time::timeout(deadline, round_trip)
        .await
        .map_err(|_| Error::Timeout(format!("no reply from {} within {:?}", addr, deadline)))?
}

/// Copy of a session failure for the waiting caller; the session keeps its own.
fn peer_failure(e: &Error) -> Error {
    match e {
        Error::Timeout(msg) => Error::Timeout(msg.clone()),
        other => Error::ConnectionFailed(other.to_string()),
    }
}

/// Convenience for tests and tools: frame a raw stream with the protocol codec.
pub fn framed<S>(stream: S) -> Framed<S, LinesCodec>
where
    S: AsyncRead + AsyncWrite,
{
    Framed::new(stream, protocol::codec())
}

//! Client for the coordinator's text protocol
//!
//! Connects to the primary coordinator, falling back to the backups in order, and issues
//! one request at a time.

use crate::common::protocol::{self, PeerRole, Request, INVALID_COMMAND, NOT_FOUND, WRITE_DONE};
use crate::common::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

/// Connect deadline used to decide whether a coordinator is alive
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);
/// Deadline for sending a request and receiving its reply
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct KvClient {
    framed: Framed<TcpStream, LinesCodec>,
    addr: String,
    request_timeout: Duration,
}

impl KvClient {
    /// Connect to the first live coordinator in `addrs`.
    pub async fn connect(addrs: &[String]) -> Result<Self> {
        Self::connect_with(addrs, PROBE_TIMEOUT, REQUEST_TIMEOUT).await
    }

    pub async fn connect_with(addrs: &[String], probe_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        for addr in addrs {
            let stream = match tokio::time::timeout(probe_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::debug!(addr = %addr, "coordinator unreachable: {}", e);
                    continue;
                }
                Err(_) => {
                    tracing::debug!(addr = %addr, "probe timed out");
                    continue;
                }
            };

            let mut framed = Framed::new(stream, protocol::codec());
            let hello = tokio::time::timeout(request_timeout, framed.send(PeerRole::Client.as_str())).await;
            match hello {
                Ok(Ok(())) => {
                    tracing::debug!(addr = %addr, "connected");
                    return Ok(Self {
                        framed,
                        addr: addr.clone(),
                        request_timeout,
                    });
                }
                Ok(Err(e)) => tracing::debug!(addr = %addr, "handshake failed: {}", e),
                Err(_) => tracing::debug!(addr = %addr, "handshake timed out"),
            }
        }

        Err(Error::NoCoordinator(addrs.join(", ")))
    }

    /// Address of the coordinator this client is talking to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn write(&mut self, key: &str, value: &str) -> Result<()> {
        check_token(key)?;
        check_token(value)?;

        let request = Request::Write {
            key: key.to_string(),
            value: value.to_string(),
        };
        match self.request(&request.encode()).await? {
            reply if reply == WRITE_DONE => Ok(()),
            reply => Err(Error::Protocol(format!("unexpected write reply: {}", reply))),
        }
    }

    /// Read a key; `None` when no coordinator or slave has it.
    pub async fn read(&mut self, key: &str) -> Result<Option<String>> {
        check_token(key)?;

        let request = Request::Read { key: key.to_string() };
        let reply = self.request(&request.encode()).await?;
        if reply == NOT_FOUND || reply == protocol::not_found_for(key) {
            return Ok(None);
        }
        if reply == INVALID_COMMAND {
            return Err(Error::Protocol(format!("coordinator rejected READ {}", key)));
        }

        let mut fields = reply.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some(k), Some(value)) if k == key => Ok(Some(value.to_string())),
            _ => Err(Error::Protocol(format!("unexpected read reply: {}", reply))),
        }
    }

    /// Send one line and wait for one reply line.
    pub async fn request(&mut self, line: &str) -> Result<String> {
        let addr = self.addr.as_str();
        let framed = &mut self.framed;
        let round_trip = async move {
            framed.send(line).await?;
            match framed.next().await {
                Some(reply) => Ok(reply?.trim_end().to_string()),
                None => Err(Error::ConnectionClosed(addr.to_string())),
            }
        };

        tokio::time::timeout(self.request_timeout, round_trip)
            .await
            .map_err(|_| Error::Timeout(format!("no reply from {}", addr)))?
    }
}

fn check_token(token: &str) -> Result<()> {
    if protocol::is_valid_token(token) {
        Ok(())
    } else {
        Err(Error::Protocol(format!("{:?} must be a single non-empty word", token)))
    }
}

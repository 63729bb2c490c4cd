//! Error types for quorumkv

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Protocol Errors ===
    #[error("Frame error: {0}")]
    Frame(#[from] tokio_util::codec::LinesCodecError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed by {0}")]
    ConnectionClosed(String),

    // === Peer Errors ===
    #[error("Slave {0} is no longer attached")]
    SlaveGone(u64),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("No coordinator reachable (tried {0})")]
    NoCoordinator(String),

    // === Durable Log Errors ===
    #[error("Log error: {0}")]
    Log(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    // === Generic ===
    #[error("Operation timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Is this a transient peer failure?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::ConnectionFailed(_)
                | Error::ConnectionClosed(_)
                | Error::SlaveGone(_)
                | Error::NoCoordinator(_)
        )
    }

    /// Did the peer go away, as opposed to misbehaving?
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed(_) | Error::SlaveGone(_) => true,
            Error::Io(e) | Error::Frame(tokio_util::codec::LinesCodecError::Io(e)) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

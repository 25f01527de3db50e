//! Error types for the RAT link

use std::io;
use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// RAT link error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No connection could be established before the connect window closed
    #[error("Connect to {address} timed out after {elapsed:?}")]
    ConnectTimeout {
        /// Target address
        address: String,
        /// Time spent attempting
        elapsed: Duration,
    },

    /// The peer actively refused the connection
    #[error("Connection to {address} refused")]
    ConnectRefused {
        /// Target address
        address: String,
    },

    /// The listen address could not be bound
    #[error("Failed to bind {address}: {source}")]
    BindError {
        /// Listen address
        address: String,
        /// Underlying socket error
        source: io::Error,
    },

    /// A frame could not be written in full
    #[error("Write failed: {0}")]
    WriteError(#[source] io::Error),

    /// A frame read failed for a reason other than an orderly close
    #[error("Read failed: {0}")]
    ReadError(#[source] io::Error),

    /// The peer closed the connection on a frame boundary
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// The peer closed the connection in the middle of a frame
    #[error("Short frame: expected {expected} bytes, received {received}")]
    ProtocolShortFrame {
        /// Fixed frame size
        expected: usize,
        /// Bytes received before the close
        received: usize,
    },

    /// A session was used for an operation that belongs to the other role
    #[error("{operation} is not permitted for the {role} role")]
    RoleMismatch {
        /// Role of the session
        role: &'static str,
        /// Attempted operation
        operation: &'static str,
    },

    /// The reconnection policy gave up; it must be restarted explicitly
    #[error("Reconnect window exhausted; restart the link to try again")]
    ReconnectExhausted,

    /// Address could not be parsed or resolved
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The command sink or sensor source failed
    #[error("Device collaborator failed: {0}")]
    Collaborator(String),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// I/O error outside the link itself (config files, stdin)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the session that produced this error can no longer be used.
    pub fn is_peer_loss(&self) -> bool {
        matches!(
            self,
            Error::WriteError(_)
                | Error::ReadError(_)
                | Error::ConnectionClosed
                | Error::ProtocolShortFrame { .. }
        )
    }
}

use crate::core::pattern::ResponseMatch;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Main error type for devlink
///
/// Cloneable so the same failure can be handed to every connect awaiter
/// and to the event surface.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// Connect deadline exceeded before the handshake completed
    #[error("Timeout connecting to {host}:{port}")]
    ConnectTimeout { host: String, port: u16 },

    /// No bytes in either direction within the idle deadline
    #[error("Connection idle for longer than {timeout:?}")]
    IdleTimeout { timeout: Duration },

    /// Error surfaced verbatim from the underlying stream
    #[error("Transport error: {0}")]
    Transport(Arc<std::io::Error>),

    /// No matching frame arrived before the request deadline
    #[error("Timeout while waiting for response after {timeout:?}")]
    RequestTimeout { timeout: Duration },

    /// The peer answered with a frame matching the failure pattern
    #[error("Peer rejected request: {}", .0.as_str())]
    RequestRejected(ResponseMatch),

    /// Operation needs a live transport
    #[error("Not connected")]
    NotConnected,

    /// The connection closed before the operation completed
    #[error("Connection closed before the operation completed")]
    ConnectionClosed,

    /// The session task is gone
    #[error("Session has shut down")]
    SessionClosed,

    /// Frame decoder failure
    #[error("Decode error: {0}")]
    Decode(String),

    /// Pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// True for connect, idle and request deadline failures
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectTimeout { .. }
                | SessionError::IdleTimeout { .. }
                | SessionError::RequestTimeout { .. }
        )
    }

    /// The matched failure token, if the peer rejected a request
    pub fn rejection(&self) -> Option<&ResponseMatch> {
        match self {
            SessionError::RequestRejected(m) => Some(m),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Transport(Arc::new(e))
    }
}

/// Result type for devlink operations
pub type Result<T> = std::result::Result<T, SessionError>;

//! Topicwatch fabric error types
//!
//! Errors raised by the messaging fabric seam and the in-process broker.

use thiserror::Error;

/// Main error type for fabric operations
#[derive(Error, Debug)]
pub enum FabricError {
    /// A logical name could not be resolved by the directory
    #[error("Name not found: {0}")]
    NameNotFound(String),

    /// A destination string could not be parsed
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Operation on a connection, session, producer or consumer that was closed
    #[error("{0} is closed")]
    Closed(&'static str),

    /// Synchronous receive and asynchronous listener mixed on one session
    #[error("Session mode conflict: {0}")]
    SessionModeConflict(String),

    /// A listener was already installed on the consumer
    #[error("Listener already set on consumer for {0}")]
    ListenerAlreadySet(String),

    /// Publishing a message failed
    #[error("Send failed on {destination}: {reason}")]
    SendFailed { destination: String, reason: String },

    /// Receive failed for a reason other than a timeout
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Dispatch thread could not be spawned
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for fabric operations
pub type Result<T> = std::result::Result<T, FabricError>;

impl FabricError {
    /// Create a send failure for `destination`
    pub fn send_failed(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SendFailed {
            destination: destination.into(),
            reason: reason.into(),
        }
    }

    /// Create a session mode conflict error
    pub fn mode_conflict(msg: impl Into<String>) -> Self {
        Self::SessionModeConflict(msg.into())
    }

    /// Check whether this error comes from using a closed handle
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Check if this error only affects the current message or operation
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SendFailed { .. } | Self::ReceiveFailed(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

//! Subscriber error types.
//!
//! Only startup faults leave [`crate::Subscriber::run`]. Per-message and
//! publish faults are logged where they happen and never propagate.

use thiserror::Error;
use topicwatch_core::error::FabricError;

/// Errors that abort a subscriber before it enters its control loop.
#[derive(Error, Debug)]
pub enum SubscriberError {
    /// The directory could not resolve a logical name
    #[error("Lookup of '{name}' failed: {source}")]
    Lookup {
        name: String,
        #[source]
        source: FabricError,
    },

    /// Creating the connection, a session, a producer or a consumer failed
    #[error("Startup failed while {stage}: {source}")]
    Startup {
        stage: &'static str,
        #[source]
        source: FabricError,
    },

    /// Configuration value could not be used
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias for subscriber operations
pub type Result<T> = std::result::Result<T, SubscriberError>;

impl SubscriberError {
    pub fn lookup(name: impl Into<String>, source: FabricError) -> Self {
        Self::Lookup {
            name: name.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Startup stage that failed, if this is a startup error.
    #[must_use]
    pub const fn stage(&self) -> Option<&'static str> {
        match self {
            Self::Startup { stage, .. } => Some(stage),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }
}

/// Attach a startup stage to a fabric result.
pub(crate) trait StartupContext<T> {
    fn stage(self, stage: &'static str) -> Result<T>;
}

impl<T> StartupContext<T> for std::result::Result<T, FabricError> {
    fn stage(self, stage: &'static str) -> Result<T> {
        self.map_err(|source| SubscriberError::Startup { stage, source })
    }
}

//! Fabric event monitoring.
//!
//! Provides an event stream for tracking handle lifecycle: connections
//! starting and handles being closed. Useful for verifying teardown order.

use std::fmt;

/// Kind of fabric handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Connection,
    Session,
    Producer,
    Consumer,
}

impl HandleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Session => "session",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fabric lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FabricEvent {
    /// Connection started delivering to listeners.
    ConnectionStarted { connection: u64 },

    /// A handle was closed. `id` is the broker-assigned handle id.
    Closed { kind: HandleKind, id: u64 },
}

impl fmt::Display for FabricEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionStarted { connection } => {
                write!(f, "Connection {connection} started")
            }
            Self::Closed { kind, id } => write!(f, "Closed {kind} {id}"),
        }
    }
}

/// Handle for receiving fabric events.
pub type FabricMonitor = flume::Receiver<FabricEvent>;

/// Sender side used by fabric implementations to emit events.
pub type FabricEventSender = flume::Sender<FabricEvent>;

/// Creates a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (FabricEventSender, FabricMonitor) {
    flume::unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fabric_event_display() {
        let event = FabricEvent::Closed {
            kind: HandleKind::Consumer,
            id: 4,
        };
        assert_eq!(event.to_string(), "Closed consumer 4");
    }

    #[test]
    fn test_monitor_channel() {
        let (sender, receiver) = create_monitor();
        sender
            .send(FabricEvent::ConnectionStarted { connection: 1 })
            .unwrap();

        let event = receiver.recv().unwrap();
        assert!(matches!(event, FabricEvent::ConnectionStarted { .. }));
    }
}

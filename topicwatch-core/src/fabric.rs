//! Trait-based messaging fabric API.
//!
//! These traits are the seam between topicwatch and whatever broker carries
//! its topics. The in-process broker in [`crate::inproc`] implements them;
//! tests implement them with fault-injecting doubles.
//!
//! Lifecycle follows the usual connection/session model:
//!
//! ```text
//! ConnectionFactory -> Connection -> Session -> { MessageProducer, MessageConsumer }
//! ```
//!
//! Every handle is independently closable. Closing is idempotent, and any
//! other operation on a closed handle fails with [`FabricError::Closed`].
//!
//! [`FabricError::Closed`]: crate::error::FabricError::Closed

use std::sync::Arc;
use std::time::Duration;

use crate::destination::Destination;
use crate::error::Result;
use crate::message::Message;

/// Acknowledgment mode for a session.
///
/// Only automatic acknowledgment is supported: a message counts as
/// acknowledged once the receive call or listener callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    AutoAcknowledge,
}

/// Creates connections to the fabric.
pub trait ConnectionFactory: Send + Sync {
    /// Open a new connection. Delivery to listeners does not begin until
    /// [`Connection::start`] is called.
    fn create_connection(&self) -> Result<Arc<dyn Connection>>;
}

/// A live connection to the fabric.
pub trait Connection: Send + Sync {
    /// Create a session on this connection.
    fn create_session(&self, ack: AckMode) -> Result<Arc<dyn Session>>;

    /// Start (or resume) delivery to asynchronous listeners.
    fn start(&self) -> Result<()>;

    /// Close the connection and every session created from it.
    fn close(&self) -> Result<()>;
}

/// A single-threaded context for producing and consuming messages.
///
/// A session serves either synchronous receives or asynchronous listeners,
/// never both. Use separate sessions when a process needs both.
pub trait Session: Send + Sync {
    fn create_producer(&self, destination: &Destination) -> Result<Arc<dyn MessageProducer>>;

    fn create_consumer(&self, destination: &Destination) -> Result<Arc<dyn MessageConsumer>>;

    /// Close the session, its producers and its consumers.
    fn close(&self) -> Result<()>;
}

/// Publishes messages to one destination.
pub trait MessageProducer: Send + Sync {
    fn send(&self, message: Message) -> Result<()>;

    fn destination(&self) -> &Destination;

    fn close(&self) -> Result<()>;
}

/// Receives messages from one destination.
#[async_trait::async_trait(?Send)]
pub trait MessageConsumer: Send + Sync {
    /// Wait up to `timeout` for the next message.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(msg))` - a message arrived
    /// - `Ok(None)` - the wait elapsed with no message
    /// - `Err(_)` - the consumer is closed or the fabric failed
    async fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>>;

    /// Install an asynchronous listener. Messages are pushed to it on the
    /// fabric's dispatch context once the connection is started.
    fn set_listener(&self, listener: Arc<dyn MessageListener>) -> Result<()>;

    fn destination(&self) -> &Destination;

    fn close(&self) -> Result<()>;
}

/// Callback for asynchronously delivered messages.
///
/// Invoked from the fabric's dispatch context, which may be a different
/// thread from the one that installed the listener.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, message: Message);
}

impl<F> MessageListener for F
where
    F: Fn(Message) + Send + Sync,
{
    fn on_message(&self, message: Message) {
        self(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_closure_listener() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let listener: Arc<dyn MessageListener> = Arc::new(move |_msg: Message| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        listener.on_message(Message::text("a"));
        listener.on_message(Message::text("b"));
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_default_ack_mode() {
        assert_eq!(AckMode::default(), AckMode::AutoAcknowledge);
    }
}

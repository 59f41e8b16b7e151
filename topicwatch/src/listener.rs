//! Data topic listener.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use topicwatch_core::fabric::MessageListener;
use topicwatch_core::message::Message;
use tracing::{debug, trace, warn, Span};

use crate::command::Inbound;
use crate::stats::StatsCounter;

/// Counts text messages delivered on the data topic.
///
/// Runs on the fabric's dispatch context. A fault while handling one message
/// is caught and logged so the fabric can move on to the next; the message
/// is acknowledged either way when the callback returns.
pub struct DataListener {
    stats: Arc<StatsCounter>,
    ignored: AtomicU64,
    span: Span,
}

impl DataListener {
    /// `span` is the logging context every record from this listener is
    /// emitted in.
    pub fn new(stats: Arc<StatsCounter>, span: Span) -> Self {
        Self {
            stats,
            ignored: AtomicU64::new(0),
            span,
        }
    }

    /// Number of non-text messages skipped so far.
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    fn handle(&self, message: &Message) {
        match Inbound::from_data(message) {
            Inbound::Data(_) => {
                let count = self.stats.increment();
                debug!("Received {count} messages.");
            }
            _ => {
                self.ignored.fetch_add(1, Ordering::Relaxed);
                trace!(message_id = message.id(), "ignoring non-text data message");
            }
        }
    }
}

impl MessageListener for DataListener {
    fn on_message(&self, message: Message) {
        let _entered = self.span.enter();
        if catch_unwind(AssertUnwindSafe(|| self.handle(&message))).is_err() {
            warn!(
                message_id = message.id(),
                "fault while handling data message, skipped"
            );
        }
    }
}

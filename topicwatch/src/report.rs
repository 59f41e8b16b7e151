//! Replies published on the control topic.

use std::sync::Arc;
use std::time::Duration;

use topicwatch_core::fabric::MessageProducer;
use topicwatch_core::message::Message;
use tracing::{debug, info, warn, Span};

use crate::stats::{StatsCounter, StatsSnapshot};

/// Publishes status reports and shutdown acknowledgments.
///
/// Publish faults are logged and swallowed: a failed reply never stops the
/// control loop from completing its transition.
pub struct ReportEmitter {
    stats: Arc<StatsCounter>,
    producer: Arc<dyn MessageProducer>,
    drain: Duration,
    shutdown_ack: String,
    span: Span,
}

impl ReportEmitter {
    pub fn new(
        stats: Arc<StatsCounter>,
        producer: Arc<dyn MessageProducer>,
        drain: Duration,
        shutdown_ack: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            stats,
            producer,
            drain,
            shutdown_ack: shutdown_ack.into(),
            span,
        }
    }

    /// Snapshot and reset the counter, publish `Received <n> in <t>ms`, then
    /// pause for the drain interval.
    ///
    /// Returns the snapshot and whether the reply was published.
    pub async fn emit_report(&self) -> (StatsSnapshot, bool) {
        let snapshot = self.stats.snapshot_and_reset();
        let text = snapshot.to_string();
        let sent = self.publish(text);

        if !self.drain.is_zero() {
            compio::time::sleep(self.drain).await;
        }
        (snapshot, sent)
    }

    /// Publish the shutdown acknowledgment. Returns whether it was published.
    pub fn emit_shutdown_ack(&self) -> bool {
        self.span.in_scope(|| info!("Got the SHUTDOWN command -> exit"));
        self.publish(self.shutdown_ack.clone())
    }

    fn publish(&self, text: String) -> bool {
        let _entered = self.span.enter();
        let destination = self.producer.destination().to_string();
        match self.producer.send(Message::text(text.clone())) {
            Ok(()) => {
                debug!(%destination, reply = %text, "published control reply");
                true
            }
            Err(e) => {
                warn!(%destination, reply = %text, "failed to publish control reply: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topicwatch_core::destination::Destination;
    use topicwatch_core::error::{FabricError, Result};

    struct FailingProducer {
        destination: Destination,
    }

    impl MessageProducer for FailingProducer {
        fn send(&self, _message: Message) -> Result<()> {
            Err(FabricError::send_failed(
                self.destination.to_string(),
                "broker unavailable",
            ))
        }

        fn destination(&self) -> &Destination {
            &self.destination
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[compio::test]
    async fn test_failed_report_still_resets() {
        let stats = Arc::new(StatsCounter::new());
        stats.increment();
        stats.increment();
        let producer = Arc::new(FailingProducer {
            destination: Destination::parse("topic/control").unwrap(),
        });
        let emitter = ReportEmitter::new(
            Arc::clone(&stats),
            producer,
            Duration::ZERO,
            "bye",
            Span::none(),
        );

        let (snapshot, sent) = emitter.emit_report().await;
        assert!(!sent);
        assert_eq!(snapshot.count, 2);
        assert_eq!(stats.count(), 0);

        assert!(!emitter.emit_shutdown_ack());
    }
}

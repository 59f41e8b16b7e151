//! Subscriber wiring: lookup, handle acquisition, control loop, teardown.

use std::sync::Arc;

use topicwatch_core::directory::Directory;
use topicwatch_core::fabric::AckMode;
use tracing::{info, info_span, Span};

use crate::config::SubscriberConfig;
use crate::control::{stop_channel, ControlLoop, RunSummary, StopHandle, StopSignal};
use crate::error::{Result, StartupContext, SubscriberError};
use crate::listener::DataListener;
use crate::report::ReportEmitter;
use crate::stats::StatsCounter;
use crate::teardown::Teardown;

/// A data topic subscriber steered through a control topic.
///
/// Data messages are counted by a [`DataListener`] on the fabric's dispatch
/// context. A [`ControlLoop`] polls the control topic on the caller's task,
/// answering `REPORT` with the count since the last report and `SHUTDOWN`
/// with an acknowledgment before everything is closed.
///
/// # Example
///
/// ```rust,no_run
/// use topicwatch::{Subscriber, SubscriberConfig};
/// use topicwatch_core::prelude::*;
///
/// # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// let broker = InprocBroker::new();
/// let directory = StaticDirectory::new()
///     .bind_factory("connectionFactory", broker.factory())
///     .bind_destination("topic/simple", "topic/simple")?
///     .bind_destination("topic/control", "topic/control")?;
///
/// let subscriber = Subscriber::new(SubscriberConfig::default());
/// let summary = subscriber.run(&directory).await?;
/// println!("exited after {} control messages", summary.commands_seen);
/// # Ok(())
/// # }
/// ```
pub struct Subscriber {
    config: SubscriberConfig,
    stats: Arc<StatsCounter>,
    stop: StopHandle,
    signal: parking_lot::Mutex<Option<StopSignal>>,
    span: Span,
}

impl Subscriber {
    pub fn new(config: SubscriberConfig) -> Self {
        let span = info_span!(
            "subscriber",
            data = %config.data_topic,
            control = %config.control_topic
        );
        let (stop, signal) = stop_channel();
        Self {
            config,
            stats: Arc::new(StatsCounter::new()),
            stop,
            signal: parking_lot::Mutex::new(Some(signal)),
            span,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    /// Handle for stopping a running subscriber from elsewhere.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Shared data counter.
    #[must_use]
    pub fn stats(&self) -> Arc<StatsCounter> {
        Arc::clone(&self.stats)
    }

    /// Resolve names, open every handle, run the control loop until it
    /// stops, then close the handles in reverse order of creation.
    ///
    /// # Errors
    ///
    /// Lookup and handle creation faults abort before the loop starts. Any
    /// handles already opened are closed before returning.
    pub async fn run(&self, directory: &dyn Directory) -> Result<RunSummary> {
        self.config.validate()?;
        let signal = self
            .signal
            .lock()
            .take()
            .ok_or_else(|| SubscriberError::config("subscriber has already run"))?;

        let cfg = &self.config;
        let factory = directory
            .lookup_factory(&cfg.connection_factory)
            .map_err(|e| SubscriberError::lookup(&cfg.connection_factory, e))?;
        let data_topic = directory
            .lookup_destination(&cfg.data_topic)
            .map_err(|e| SubscriberError::lookup(&cfg.data_topic, e))?;
        let control_topic = directory
            .lookup_destination(&cfg.control_topic)
            .map_err(|e| SubscriberError::lookup(&cfg.control_topic, e))?;

        let mut teardown = Teardown::new(self.span.clone());

        let connection = factory
            .create_connection()
            .stage("creating connection")?;
        {
            let connection = Arc::clone(&connection);
            teardown.push("connection", move || connection.close());
        }

        let session = connection
            .create_session(AckMode::AutoAcknowledge)
            .stage("creating data session")?;
        {
            let session = Arc::clone(&session);
            teardown.push("data session", move || session.close());
        }

        let control_producer = session
            .create_producer(&control_topic)
            .stage("creating control producer")?;
        {
            let producer = Arc::clone(&control_producer);
            teardown.push("control producer", move || producer.close());
        }

        let data_consumer = session
            .create_consumer(&data_topic)
            .stage("creating data consumer")?;
        {
            let consumer = Arc::clone(&data_consumer);
            teardown.push("data consumer", move || consumer.close());
        }
        let listener = DataListener::new(
            Arc::clone(&self.stats),
            info_span!(parent: &self.span, "data_listener", topic = %data_topic),
        );
        data_consumer
            .set_listener(Arc::new(listener))
            .stage("installing data listener")?;

        // A synchronous consumer cannot share a session with a listener.
        let control_session = connection
            .create_session(AckMode::AutoAcknowledge)
            .stage("creating control session")?;
        {
            let session = Arc::clone(&control_session);
            teardown.push("control session", move || session.close());
        }

        let control_consumer = control_session
            .create_consumer(&control_topic)
            .stage("creating control consumer")?;
        {
            let consumer = Arc::clone(&control_consumer);
            teardown.push("control consumer", move || consumer.close());
        }

        connection.start().stage("starting connection")?;

        let emitter = ReportEmitter::new(
            Arc::clone(&self.stats),
            control_producer,
            cfg.report_drain,
            cfg.shutdown_ack.clone(),
            info_span!(parent: &self.span, "report", topic = %control_topic),
        );
        let mut control_loop = ControlLoop::new(
            control_consumer,
            emitter,
            cfg.receive_timeout,
            signal,
            info_span!(parent: &self.span, "control_loop", topic = %control_topic),
        );

        let summary = control_loop.run().await;

        let failed = teardown.release_all();
        self.span.in_scope(|| {
            info!(
                commands = summary.commands_seen,
                reports = summary.reports_sent,
                failed_releases = failed,
                "subscriber stopped"
            );
        });
        Ok(summary)
    }
}

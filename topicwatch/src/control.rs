//! Control topic loop.
//!
//! State machine:
//!
//! ```text
//!             REPORT                      SHUTDOWN
//! Listening ---------> Reporting      Listening ---------> ShuttingDown ---> Stopped
//!     ^                    |
//!     +--------------------+
//! ```
//!
//! Each iteration is one bounded-wait receive raced against the stop signal.
//! An elapsed wait just loops; only a SHUTDOWN command, a stop request or a
//! closed consumer ends the loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, Sender};
use futures::{select, FutureExt};
use topicwatch_core::fabric::MessageConsumer;
use topicwatch_core::message::Message;
use tracing::{debug, info, trace, warn, Span};

use crate::command::{Command, Inbound};
use crate::report::ReportEmitter;

/// Control loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Listening,
    Reporting,
    ShuttingDown,
    Stopped,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listening => "listening",
            Self::Reporting => "reporting",
            Self::ShuttingDown => "shutting-down",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the loop reached `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// SHUTDOWN command received and acknowledged
    Shutdown,
    /// Stop requested through a [`StopHandle`]
    Cancelled,
    /// Control consumer was closed underneath the loop
    ConsumerClosed,
}

/// Counters reported when the loop finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Text messages seen on the control topic
    pub commands_seen: u64,
    /// Reports successfully published
    pub reports_sent: u64,
    pub exit: ExitReason,
}

/// Requests cooperative cancellation of a running control loop.
///
/// Takes effect at the next iteration boundary, or immediately if the loop
/// is waiting on a receive. Cloneable and usable from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        // Full means a stop is already pending.
        let _ = self.tx.try_send(());
    }
}

/// Receiving side of a [`StopHandle`].
#[derive(Debug)]
pub struct StopSignal {
    rx: Receiver<()>,
}

impl StopSignal {
    /// Resolves once a stop is requested. Never resolves after every
    /// [`StopHandle`] is dropped without requesting one.
    async fn requested(&self) {
        if self.rx.recv_async().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

/// Create a linked stop handle and signal.
#[must_use]
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = flume::bounded(1);
    (StopHandle { tx }, StopSignal { rx })
}

/// Synchronous polling loop on the control topic.
pub struct ControlLoop {
    consumer: Arc<dyn MessageConsumer>,
    emitter: ReportEmitter,
    receive_timeout: Duration,
    stop: StopSignal,
    state: LoopState,
    sequence: u64,
    reports_sent: u64,
    exit: Option<ExitReason>,
    span: Span,
}

impl ControlLoop {
    pub fn new(
        consumer: Arc<dyn MessageConsumer>,
        emitter: ReportEmitter,
        receive_timeout: Duration,
        stop: StopSignal,
        span: Span,
    ) -> Self {
        Self {
            consumer,
            emitter,
            receive_timeout,
            stop,
            state: LoopState::Listening,
            sequence: 0,
            reports_sent: 0,
            exit: None,
            span,
        }
    }

    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Number of text messages received on the control topic so far.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub const fn exit_reason(&self) -> Option<ExitReason> {
        self.exit
    }

    /// Run until `Stopped`.
    pub async fn run(&mut self) -> RunSummary {
        self.span.in_scope(|| info!("Start control message consumer"));
        while self.poll_once().await != LoopState::Stopped {}

        RunSummary {
            commands_seen: self.sequence,
            reports_sent: self.reports_sent,
            exit: self.exit.unwrap_or(ExitReason::Cancelled),
        }
    }

    /// One iteration: wait up to the receive timeout for a control message
    /// and act on it. Returns the state afterwards.
    pub async fn poll_once(&mut self) -> LoopState {
        if self.state == LoopState::Stopped {
            return self.state;
        }
        if self.stop.rx.try_recv().is_ok() {
            self.finish(ExitReason::Cancelled);
            return self.state;
        }

        let received = {
            let mut receive = std::pin::pin!(self.consumer.receive_timeout(self.receive_timeout).fuse());
            let mut stop = std::pin::pin!(self.stop.requested().fuse());
            select! {
                result = receive => Some(result),
                _ = stop => None,
            }
        };

        match received {
            None => self.finish(ExitReason::Cancelled),
            Some(Ok(None)) => {
                self.span.in_scope(|| {
                    trace!("no control message within {:?}", self.receive_timeout);
                });
            }
            Some(Ok(Some(message))) => self.dispatch(&message).await,
            Some(Err(e)) if e.is_closed() => {
                self.span.in_scope(|| warn!("control consumer closed, leaving control loop"));
                self.finish(ExitReason::ConsumerClosed);
            }
            Some(Err(e)) => {
                self.span.in_scope(|| warn!("control receive failed: {e}"));
            }
        }
        self.state
    }

    async fn dispatch(&mut self, message: &Message) {
        let text = match Inbound::from_control(message) {
            Inbound::Command(text) => text,
            _ => {
                self.span.in_scope(|| {
                    debug!(message_id = message.id(), "ignoring non-text control message");
                });
                return;
            }
        };

        self.sequence += 1;
        let sequence = self.sequence;
        self.span.in_scope(|| info!("Got {sequence}. message: {text}"));

        match Command::decode(text) {
            Command::Report => {
                self.state = LoopState::Reporting;
                let (snapshot, sent) = self.emitter.emit_report().await;
                if sent {
                    self.reports_sent += 1;
                }
                self.span.in_scope(|| debug!(count = snapshot.count, sent, "report handled"));
                self.state = LoopState::Listening;
            }
            Command::Shutdown => {
                self.state = LoopState::ShuttingDown;
                self.emitter.emit_shutdown_ack();
                self.finish(ExitReason::Shutdown);
            }
            Command::Unknown => {
                self.span.in_scope(|| debug!("unknown control command '{text}', ignored"));
            }
        }
    }

    fn finish(&mut self, reason: ExitReason) {
        self.state = LoopState::Stopped;
        self.exit = Some(reason);
        self.span.in_scope(|| info!(reason = ?reason, "control loop stopped"));
    }
}

//! In-process publish/subscribe fabric.
//!
//! The inproc fabric implements the [`crate::fabric`] traits with channels
//! inside one process, without any network or serialization overhead.
//!
//! # Features
//!
//! - **Fan-out**: every consumer on a topic gets its own unbounded queue
//! - **Thread-safe**: topic table protected by `DashMap`
//! - **Asynchronous delivery**: each listener runs on its own dispatch thread,
//!   gated on [`Connection::start`]
//! - **Session rules**: a session serves synchronous receives or listeners,
//!   never both
//!
//! # Usage
//!
//! ```rust,no_run
//! use topicwatch_core::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> topicwatch_core::error::Result<()> {
//! let broker = InprocBroker::new();
//! let topic = Destination::parse("topic/simple")?;
//!
//! let connection = broker.factory().create_connection()?;
//! let session = connection.create_session(AckMode::AutoAcknowledge)?;
//! let consumer = session.create_consumer(&topic)?;
//! let producer = session.create_producer(&topic)?;
//!
//! producer.send(Message::text("hello"))?;
//! let msg = consumer.receive_timeout(Duration::from_secs(1)).await?;
//! assert_eq!(msg.unwrap().as_text(), Some("hello"));
//!
//! connection.close()?;
//! # Ok(())
//! # }
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use dashmap::DashMap;
use flume::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::destination::Destination;
use crate::error::{FabricError, Result};
use crate::fabric::{
    AckMode, Connection, ConnectionFactory, MessageConsumer, MessageListener, MessageProducer,
    Session,
};
use crate::message::Message;
use crate::monitor::{create_monitor, FabricEvent, FabricEventSender, FabricMonitor, HandleKind};

/// Queue feeding one consumer.
type ConsumerQueue = (u64, Sender<Message>);

/// Shared broker state.
struct BrokerInner {
    /// Topic name -> consumer queues. Inline up to 4 consumers per topic.
    topics: DashMap<String, SmallVec<[ConsumerQueue; 4]>>,
    next_message_id: AtomicU64,
    next_handle_id: AtomicU64,
    monitor: Mutex<Option<FabricEventSender>>,
}

impl BrokerInner {
    fn next_handle(&self) -> u64 {
        self.next_handle_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn emit(&self, event: FabricEvent) {
        if let Some(monitor) = self.monitor.lock().as_ref() {
            let _ = monitor.send(event);
        }
    }

    fn register(&self, destination: &Destination, consumer_id: u64) -> Receiver<Message> {
        let (tx, rx) = flume::unbounded();
        self.topics
            .entry(destination.name().to_string())
            .or_default()
            .push((consumer_id, tx));
        rx
    }

    fn unregister(&self, destination: &Destination, consumer_id: u64) {
        if let Some(mut queues) = self.topics.get_mut(destination.name()) {
            queues.retain(|(id, _)| *id != consumer_id);
        }
        self.topics
            .remove_if(destination.name(), |_, queues| queues.is_empty());
    }

    /// Fan a message out to every consumer of `destination`.
    ///
    /// Returns how many consumers it was queued for.
    fn publish(&self, destination: &Destination, message: Message) -> usize {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        let message = message.stamped(id, destination.clone());

        let Some(queues) = self.topics.get(destination.name()) else {
            trace!("[inproc] no consumers on {destination}, dropping message {id}");
            return 0;
        };

        queues
            .iter()
            .filter(|(_, tx)| tx.send(message.clone()).is_ok())
            .count()
    }
}

/// An in-process broker.
///
/// Cloning is cheap; clones share the same topics.
#[derive(Clone)]
pub struct InprocBroker {
    inner: Arc<BrokerInner>,
}

impl Default for InprocBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InprocBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: DashMap::new(),
                next_message_id: AtomicU64::new(0),
                next_handle_id: AtomicU64::new(0),
                monitor: Mutex::new(None),
            }),
        }
    }

    /// Connection factory bound to this broker.
    #[must_use]
    pub fn factory(&self) -> Arc<dyn ConnectionFactory> {
        Arc::new(InprocConnectionFactory {
            broker: Arc::clone(&self.inner),
        })
    }

    /// Enable monitoring for this broker.
    ///
    /// Returns a receiver for lifecycle events. A second call replaces the
    /// previous monitor.
    pub fn monitor(&self) -> FabricMonitor {
        let (sender, receiver) = create_monitor();
        *self.inner.monitor.lock() = Some(sender);
        receiver
    }

    /// Publish without going through a connection.
    pub fn publish(&self, destination: &Destination, message: Message) -> usize {
        self.inner.publish(destination, message)
    }

    /// Number of open consumers on `destination`.
    #[must_use]
    pub fn consumer_count(&self, destination: &Destination) -> usize {
        self.inner
            .topics
            .get(destination.name())
            .map_or(0, |queues| queues.len())
    }
}

struct InprocConnectionFactory {
    broker: Arc<BrokerInner>,
}

impl ConnectionFactory for InprocConnectionFactory {
    fn create_connection(&self) -> Result<Arc<dyn Connection>> {
        let id = self.broker.next_handle();
        debug!("[inproc] connection {id} created");
        Ok(Arc::new(InprocConnection {
            id,
            broker: Arc::clone(&self.broker),
            gate: Arc::new(StartGate::default()),
            closed: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
        }))
    }
}

/// Blocks dispatch threads until the owning connection starts or closes.
#[derive(Default)]
struct StartGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

#[derive(Default)]
struct GateState {
    started: bool,
    closed: bool,
}

impl StartGate {
    fn open(&self) {
        self.state.lock().started = true;
        self.cond.notify_all();
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }

    /// Wake waiters so they re-check their consumer's closed flag.
    fn notify(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    /// Returns `true` once started, `false` if the connection or the
    /// consumer closed first.
    fn wait(&self, consumer_closed: &AtomicBool) -> bool {
        let mut state = self.state.lock();
        while !state.started && !state.closed && !consumer_closed.load(Ordering::Acquire) {
            self.cond.wait(&mut state);
        }
        !state.closed && !consumer_closed.load(Ordering::Acquire)
    }
}

struct InprocConnection {
    id: u64,
    broker: Arc<BrokerInner>,
    gate: Arc<StartGate>,
    closed: AtomicBool,
    sessions: Mutex<Vec<Arc<InprocSession>>>,
}

impl Connection for InprocConnection {
    fn create_session(&self, _ack: AckMode) -> Result<Arc<dyn Session>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FabricError::Closed("connection"));
        }
        let session = Arc::new(InprocSession {
            id: self.broker.next_handle(),
            broker: Arc::clone(&self.broker),
            gate: Arc::clone(&self.gate),
            mode: Arc::new(Mutex::new(SessionMode::Unset)),
            closed: AtomicBool::new(false),
            producers: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
        });
        debug!("[inproc] session {} created on connection {}", session.id, self.id);
        self.sessions.lock().push(Arc::clone(&session));
        Ok(session)
    }

    fn start(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FabricError::Closed("connection"));
        }
        self.gate.open();
        self.broker
            .emit(FabricEvent::ConnectionStarted { connection: self.id });
        debug!("[inproc] connection {} started", self.id);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.gate.close();
        let sessions = std::mem::take(&mut *self.sessions.lock());
        let result = close_each(&sessions, HandleKind::Session, |s| s.close());
        self.broker.emit(FabricEvent::Closed {
            kind: HandleKind::Connection,
            id: self.id,
        });
        debug!("[inproc] connection {} closed", self.id);
        result
    }
}

/// Close children newest first. Every child is attempted; the first
/// failure is returned after the rest have been closed.
fn close_each<T>(handles: &[T], kind: HandleKind, close: impl Fn(&T) -> Result<()>) -> Result<()> {
    let mut first = None;
    for handle in handles.iter().rev() {
        if let Err(e) = close(handle) {
            warn!("[inproc] failed to close {kind}: {e}");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}

/// What a session has been used for so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionMode {
    Unset,
    Synchronous,
    Asynchronous,
}

impl SessionMode {
    /// Claim the session for `wanted`, failing if it already serves the other mode.
    fn claim(slot: &Mutex<Self>, wanted: Self) -> Result<()> {
        let mut mode = slot.lock();
        match *mode {
            Self::Unset => {
                *mode = wanted;
                Ok(())
            }
            current if current == wanted => Ok(()),
            Self::Asynchronous => Err(FabricError::mode_conflict(
                "synchronous receive on a session that has an asynchronous listener",
            )),
            Self::Synchronous => Err(FabricError::mode_conflict(
                "asynchronous listener on a session used for synchronous receive",
            )),
        }
    }
}

struct InprocSession {
    id: u64,
    broker: Arc<BrokerInner>,
    gate: Arc<StartGate>,
    mode: Arc<Mutex<SessionMode>>,
    closed: AtomicBool,
    producers: Mutex<Vec<Arc<InprocProducer>>>,
    consumers: Mutex<Vec<Arc<InprocConsumer>>>,
}

impl InprocSession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(FabricError::Closed("session"))
        } else {
            Ok(())
        }
    }
}

impl Session for InprocSession {
    fn create_producer(&self, destination: &Destination) -> Result<Arc<dyn MessageProducer>> {
        self.ensure_open()?;
        let producer = Arc::new(InprocProducer {
            id: self.broker.next_handle(),
            destination: destination.clone(),
            broker: Arc::clone(&self.broker),
            closed: AtomicBool::new(false),
        });
        self.producers.lock().push(Arc::clone(&producer));
        Ok(producer)
    }

    fn create_consumer(&self, destination: &Destination) -> Result<Arc<dyn MessageConsumer>> {
        self.ensure_open()?;
        let id = self.broker.next_handle();
        let rx = self.broker.register(destination, id);
        let consumer = Arc::new(InprocConsumer {
            id,
            destination: destination.clone(),
            broker: Arc::clone(&self.broker),
            rx,
            mode: Arc::clone(&self.mode),
            gate: Arc::clone(&self.gate),
            closed: Arc::new(AtomicBool::new(false)),
            dispatcher: Mutex::new(None),
        });
        debug!("[inproc] consumer {id} subscribed to {destination}");
        self.consumers.lock().push(Arc::clone(&consumer));
        Ok(consumer)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let consumers = std::mem::take(&mut *self.consumers.lock());
        let producers = std::mem::take(&mut *self.producers.lock());
        let consumed = close_each(&consumers, HandleKind::Consumer, |c| c.close());
        let produced = close_each(&producers, HandleKind::Producer, |p| p.close());
        self.broker.emit(FabricEvent::Closed {
            kind: HandleKind::Session,
            id: self.id,
        });
        consumed.and(produced)
    }
}

struct InprocProducer {
    id: u64,
    destination: Destination,
    broker: Arc<BrokerInner>,
    closed: AtomicBool,
}

impl MessageProducer for InprocProducer {
    fn send(&self, message: Message) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FabricError::Closed("producer"));
        }
        let delivered = self.broker.publish(&self.destination, message);
        trace!(
            "[inproc] producer {} published to {} ({} consumers)",
            self.id,
            self.destination,
            delivered
        );
        Ok(())
    }

    fn destination(&self) -> &Destination {
        &self.destination
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.broker.emit(FabricEvent::Closed {
                kind: HandleKind::Producer,
                id: self.id,
            });
        }
        Ok(())
    }
}

struct InprocConsumer {
    id: u64,
    destination: Destination,
    broker: Arc<BrokerInner>,
    rx: Receiver<Message>,
    mode: Arc<Mutex<SessionMode>>,
    gate: Arc<StartGate>,
    closed: Arc<AtomicBool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl InprocConsumer {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(FabricError::Closed("consumer"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait(?Send)]
impl MessageConsumer for InprocConsumer {
    async fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>> {
        self.ensure_open()?;
        SessionMode::claim(&self.mode, SessionMode::Synchronous)?;

        match compio::time::timeout(timeout, self.rx.recv_async()).await {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(_disconnected)) => {
                self.ensure_open()?;
                Err(FabricError::ReceiveFailed(format!(
                    "queue for {} disconnected",
                    self.destination
                )))
            }
            Err(_elapsed) => Ok(None),
        }
    }

    fn set_listener(&self, listener: Arc<dyn MessageListener>) -> Result<()> {
        self.ensure_open()?;
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            return Err(FabricError::ListenerAlreadySet(self.destination.to_string()));
        }
        SessionMode::claim(&self.mode, SessionMode::Asynchronous)?;

        let rx = self.rx.clone();
        let gate = Arc::clone(&self.gate);
        let closed = Arc::clone(&self.closed);
        let consumer_id = self.id;

        let handle = std::thread::Builder::new()
            .name(format!("inproc-dispatch-{consumer_id}"))
            .spawn(move || dispatch(consumer_id, &rx, &gate, &closed, listener.as_ref()))?;
        *dispatcher = Some(handle);
        Ok(())
    }

    fn destination(&self) -> &Destination {
        &self.destination
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Dropping the broker-side sender disconnects the dispatch thread.
        self.broker.unregister(&self.destination, self.id);
        self.gate.notify();

        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.thread().id() == std::thread::current().id() {
                debug!("[inproc] consumer {} closed from its own listener", self.id);
            } else if handle.join().is_err() {
                warn!("[inproc] dispatch thread for consumer {} panicked", self.id);
            }
        }

        self.broker.emit(FabricEvent::Closed {
            kind: HandleKind::Consumer,
            id: self.id,
        });
        Ok(())
    }
}

/// Dispatch loop for one asynchronous consumer.
fn dispatch(
    consumer_id: u64,
    rx: &Receiver<Message>,
    gate: &StartGate,
    closed: &AtomicBool,
    listener: &dyn MessageListener,
) {
    if !gate.wait(closed) {
        trace!("[inproc] consumer {consumer_id} closed before connection start");
        return;
    }

    while let Ok(message) = rx.recv() {
        if closed.load(Ordering::Acquire) {
            break;
        }
        let id = message.id();
        if catch_unwind(AssertUnwindSafe(|| listener.on_message(message))).is_err() {
            warn!("[inproc] listener on consumer {consumer_id} panicked on message {id}");
        }
    }
    trace!("[inproc] dispatch for consumer {consumer_id} finished");
}

//! Topicwatch Core
//!
//! This crate contains the messaging-fabric building blocks:
//! - Topic naming (`destination`)
//! - Text / binary messages (`message`)
//! - Connection, session, producer and consumer traits (`fabric`)
//! - Logical name lookup (`directory`)
//! - Handle lifecycle events (`monitor`)
//! - In-process pub/sub broker implementing the traits (`inproc`)
//! - Error types (`error`)

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
pub mod destination;
pub mod directory;
pub mod error;
pub mod fabric;
pub mod inproc;
pub mod message;
pub mod monitor;

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::destination::Destination;
    pub use crate::directory::{Directory, StaticDirectory};
    pub use crate::error::{FabricError, Result};
    pub use crate::fabric::{
        AckMode, Connection, ConnectionFactory, MessageConsumer, MessageListener,
        MessageProducer, Session,
    };
    pub use crate::inproc::InprocBroker;
    pub use crate::message::{Body, Message};
    pub use crate::monitor::{FabricEvent, FabricMonitor, HandleKind};
}

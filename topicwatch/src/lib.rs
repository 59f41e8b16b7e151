//! # Topicwatch
//!
//! A topic subscriber with an out-of-band control channel.
//!
//! ## Architecture
//!
//! Topicwatch consumes one data topic asynchronously while polling a second,
//! control topic for administrative commands:
//!
//! - **`topicwatch-core`**: fabric traits, lookup directory, in-process broker
//! - **`topicwatch`**: the subscriber (this crate)
//!
//! Two concurrency contexts run side by side:
//!
//! - the fabric's dispatch context pushes data messages into a
//!   [`DataListener`], which counts them in a shared [`StatsCounter`]
//! - the [`ControlLoop`] performs bounded-wait receives on the control topic
//!   and owns the exit condition
//!
//! The counter is the only state they share.
//!
//! ## Control commands
//!
//! | Command    | Reply                          | Effect                    |
//! |------------|--------------------------------|---------------------------|
//! | `REPORT`   | `Received <n> in <t>ms`        | counter reset             |
//! | `SHUTDOWN` | `SHUTDOWN is being performed`  | loop stops, handles close |
//!
//! Anything else on the control topic is logged and ignored.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use topicwatch::{Subscriber, SubscriberConfig};
//! use topicwatch_core::prelude::*;
//!
//! #[compio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     topicwatch::dev_tracing::init_tracing();
//!
//!     let broker = InprocBroker::new();
//!     let directory = StaticDirectory::new()
//!         .bind_factory("connectionFactory", broker.factory())
//!         .bind_destination("topic/simple", "topic/simple")?
//!         .bind_destination("topic/control", "topic/control")?;
//!
//!     let summary = Subscriber::new(SubscriberConfig::from_env()?)
//!         .run(&directory)
//!         .await?;
//!     println!("{summary:?}");
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod command;
pub mod config;
pub mod control;
pub mod dev_tracing;
pub mod error;
pub mod listener;
pub mod report;
pub mod stats;
pub mod subscriber;
pub mod teardown;

pub use command::{Command, Inbound};
pub use config::SubscriberConfig;
pub use control::{ControlLoop, ExitReason, LoopState, RunSummary, StopHandle};
pub use error::{Result, SubscriberError};
pub use listener::DataListener;
pub use report::ReportEmitter;
pub use stats::{StatsCounter, StatsSnapshot};
pub use subscriber::Subscriber;

//! Subscriber demonstration on the in-process broker
//!
//! A publisher thread sends a burst of data messages, asks for a report,
//! sends a second burst, asks again, then shuts the subscriber down. An
//! observer prints every reply that appears on the control topic.
//!
//! # Run
//!
//! ```sh
//! RUST_LOG=topicwatch=debug cargo run --example simple_topic
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use topicwatch::{Command, Subscriber, SubscriberConfig};
use topicwatch_core::prelude::*;

const BURSTS: &[usize] = &[1_000, 250];

#[compio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    topicwatch::dev_tracing::init_tracing();

    let broker = InprocBroker::new();
    let directory = StaticDirectory::new()
        .bind_factory("connectionFactory", broker.factory())
        .bind_destination("topic/simple", "topic/simple")?
        .bind_destination("topic/control", "topic/control")?;

    let data = Destination::parse("topic/simple")?;
    let control = Destination::parse("topic/control")?;

    // Observer on its own connection, printing replies as they arrive.
    let observer_connection = broker.factory().create_connection()?;
    let observer_session = observer_connection.create_session(AckMode::AutoAcknowledge)?;
    let observer = observer_session.create_consumer(&control)?;
    observer.set_listener(Arc::new(|message: Message| {
        if let Some(text) = message.as_text() {
            if Command::decode(text) == Command::Unknown {
                println!("[observer] {text}");
            }
        }
    }))?;
    observer_connection.start()?;

    let publisher = {
        let broker = broker.clone();
        thread::spawn(move || {
            while broker.consumer_count(&data) == 0 || broker.consumer_count(&control) < 2 {
                thread::sleep(Duration::from_millis(10));
            }
            for &burst in BURSTS {
                for i in 0..burst {
                    broker.publish(&data, Message::text(format!("message {i}")));
                }
                println!("[publisher] sent {burst} messages");
                thread::sleep(Duration::from_millis(50));
                broker.publish(&control, Message::text(Command::REPORT));
                thread::sleep(Duration::from_millis(600));
            }
            broker.publish(&control, Message::text(Command::SHUTDOWN));
        })
    };

    let config = SubscriberConfig::from_env()?.with_receive_timeout(Duration::from_secs(1));
    let summary = Subscriber::new(config).run(&directory).await?;
    println!(
        "[subscriber] exit={:?} commands={} reports={}",
        summary.exit, summary.commands_seen, summary.reports_sent
    );

    publisher.join().map_err(|_| "publisher panicked")?;
    observer_connection.close()?;
    Ok(())
}

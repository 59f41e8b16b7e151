//! End-to-end subscriber scenarios over the in-process fabric
//!
//! Each test runs the subscriber and a driver side by side on one compio
//! task. The driver publishes data and control messages through the broker
//! and watches replies with its own consumer on the control topic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use topicwatch::{ExitReason, Subscriber, SubscriberConfig, SubscriberError};
use topicwatch_core::prelude::*;

const ACK: &str = "SHUTDOWN is being performed";

struct Fixture {
    broker: InprocBroker,
    directory: StaticDirectory,
    data: Destination,
    control: Destination,
    observer: Arc<dyn MessageConsumer>,
    observer_connection: Arc<dyn Connection>,
}

fn fixture() -> Fixture {
    topicwatch::dev_tracing::init_tracing();

    let broker = InprocBroker::new();
    let directory = StaticDirectory::new()
        .bind_factory("connectionFactory", broker.factory())
        .bind_destination("topic/simple", "topic/simple")
        .unwrap()
        .bind_destination("topic/control", "topic/control")
        .unwrap();

    let observer_connection = broker.factory().create_connection().unwrap();
    let observer_session = observer_connection
        .create_session(AckMode::AutoAcknowledge)
        .unwrap();
    let control = Destination::parse("topic/control").unwrap();
    let observer = observer_session.create_consumer(&control).unwrap();

    Fixture {
        broker,
        directory,
        data: Destination::parse("topic/simple").unwrap(),
        control,
        observer,
        observer_connection,
    }
}

fn config() -> SubscriberConfig {
    SubscriberConfig::default()
        .with_receive_timeout(Duration::from_millis(50))
        .with_report_drain(Duration::from_millis(10))
}

/// Wait (cooperatively) until `cond` holds or two seconds pass.
async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        if Instant::now() > deadline {
            return false;
        }
        compio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

/// The subscriber is up once both its consumers are registered.
async fn wait_for_subscriber(fx: &Fixture) {
    let up = wait_until(|| {
        fx.broker.consumer_count(&fx.data) == 1 && fx.broker.consumer_count(&fx.control) == 2
    })
    .await;
    assert!(up, "subscriber never subscribed");
}

/// Everything queued for the observer, minus the commands it also sees.
async fn replies(observer: &Arc<dyn MessageConsumer>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(msg) = observer
        .receive_timeout(Duration::from_millis(20))
        .await
        .unwrap()
    {
        if let Some(text) = msg.as_text() {
            if text != "REPORT" && text != "SHUTDOWN" {
                out.push(text.to_string());
            }
        }
    }
    out
}

fn report_count(reply: &str) -> Option<u64> {
    let rest = reply.strip_prefix("Received ")?;
    let (count, elapsed) = rest.split_once(" in ")?;
    elapsed.strip_suffix("ms")?.parse::<u64>().ok()?;
    count.parse().ok()
}

#[compio::test]
async fn test_three_messages_then_report() {
    let fx = fixture();
    let subscriber = Subscriber::new(config());
    let stats = subscriber.stats();

    let driver = async {
        wait_for_subscriber(&fx).await;
        for text in ["a", "b", "c"] {
            fx.broker.publish(&fx.data, Message::text(text));
        }
        assert!(wait_until(|| stats.count() == 3).await);

        fx.broker.publish(&fx.control, Message::text("REPORT"));
        assert!(wait_until(|| stats.count() == 0).await);
        fx.broker.publish(&fx.control, Message::text("SHUTDOWN"));
    };

    let (result, ()) = futures::join!(subscriber.run(&fx.directory), driver);
    let summary = result.unwrap();
    assert_eq!(summary.exit, ExitReason::Shutdown);
    assert_eq!(summary.reports_sent, 1);
    // REPORT, the subscriber's own reply echoed back on the control topic, SHUTDOWN
    assert_eq!(summary.commands_seen, 3);

    let replies = replies(&fx.observer).await;
    assert_eq!(replies.len(), 2, "unexpected replies: {replies:?}");
    assert_eq!(report_count(&replies[0]), Some(3), "bad report: {}", replies[0]);
    assert_eq!(replies[1], ACK);
    assert_eq!(stats.count(), 0);

    fx.observer_connection.close().unwrap();
}

#[compio::test]
async fn test_report_with_no_data() {
    let fx = fixture();
    let subscriber = Subscriber::new(config());

    let driver = async {
        wait_for_subscriber(&fx).await;
        fx.broker.publish(&fx.control, Message::text("REPORT"));
        fx.broker.publish(&fx.control, Message::text("REPORT"));
        fx.broker.publish(&fx.control, Message::text("SHUTDOWN"));
    };

    let (result, ()) = futures::join!(subscriber.run(&fx.directory), driver);
    assert_eq!(result.unwrap().reports_sent, 2);

    let replies = replies(&fx.observer).await;
    assert_eq!(report_count(&replies[0]), Some(0));
    assert_eq!(report_count(&replies[1]), Some(0));
    assert_eq!(replies[2], ACK);

    fx.observer_connection.close().unwrap();
}

#[compio::test]
async fn test_shutdown_without_data_releases_everything() {
    let fx = fixture();
    let monitor = fx.broker.monitor();
    let subscriber = Subscriber::new(config());

    let driver = async {
        wait_for_subscriber(&fx).await;
        fx.broker.publish(&fx.control, Message::text("SHUTDOWN"));
    };

    let (result, ()) = futures::join!(subscriber.run(&fx.directory), driver);
    let summary = result.unwrap();
    assert_eq!(summary.exit, ExitReason::Shutdown);
    assert_eq!(summary.commands_seen, 1);

    assert_eq!(replies(&fx.observer).await, vec![ACK.to_string()]);
    assert_eq!(fx.broker.consumer_count(&fx.data), 0);
    assert_eq!(fx.broker.consumer_count(&fx.control), 1, "only the observer remains");

    // control consumer, control session, data consumer, control producer,
    // data session, connection
    let closed: Vec<HandleKind> = monitor
        .drain()
        .filter_map(|event| match event {
            FabricEvent::Closed { kind, .. } => Some(kind),
            FabricEvent::ConnectionStarted { .. } => None,
        })
        .collect();
    assert_eq!(
        closed,
        vec![
            HandleKind::Consumer,
            HandleKind::Session,
            HandleKind::Consumer,
            HandleKind::Producer,
            HandleKind::Session,
            HandleKind::Connection,
        ]
    );

    fx.observer_connection.close().unwrap();
}

#[compio::test]
async fn test_data_after_shutdown_is_not_counted() {
    let fx = fixture();
    let subscriber = Subscriber::new(config());
    let stats = subscriber.stats();

    let driver = async {
        wait_for_subscriber(&fx).await;
        fx.broker.publish(&fx.control, Message::text("SHUTDOWN"));
    };

    let (result, ()) = futures::join!(subscriber.run(&fx.directory), driver);
    result.unwrap();

    assert_eq!(fx.broker.publish(&fx.data, Message::text("late")), 0);
    assert_eq!(stats.count(), 0);

    fx.observer_connection.close().unwrap();
}

#[compio::test]
async fn test_no_control_traffic_keeps_running() {
    let fx = fixture();
    let subscriber = Subscriber::new(config());
    let stop = subscriber.stop_handle();

    let driver = async {
        wait_for_subscriber(&fx).await;
        // Several receive timeouts pass without the loop exiting.
        compio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.broker.consumer_count(&fx.control), 2);
        stop.stop();
    };

    let (result, ()) = futures::join!(subscriber.run(&fx.directory), driver);
    let summary = result.unwrap();
    assert_eq!(summary.exit, ExitReason::Cancelled);
    assert_eq!(summary.commands_seen, 0);

    // A cancelled run publishes no acknowledgment.
    assert!(replies(&fx.observer).await.is_empty());
    assert_eq!(fx.broker.consumer_count(&fx.data), 0);

    fx.observer_connection.close().unwrap();
}

#[compio::test]
async fn test_interleaved_reports_account_for_every_message() {
    const TOTAL: u64 = 2_000;

    let fx = fixture();
    let subscriber = Subscriber::new(config().with_report_drain(Duration::ZERO));
    let stats = subscriber.stats();
    let publisher = fx.broker.clone();
    let data = fx.data.clone();
    let control = fx.control.clone();

    let driver = async {
        wait_for_subscriber(&fx).await;

        let producer = std::thread::spawn(move || {
            for i in 0..TOTAL {
                publisher.publish(&data, Message::text(format!("msg-{i}")));
                if i % 250 == 0 {
                    publisher.publish(&control, Message::text("REPORT"));
                }
            }
        });
        assert!(wait_until(|| producer.is_finished()).await);
        producer.join().unwrap();

        // Every message is either in a report already read or in the
        // current window once delivery has caught up.
        let mut reported = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            reported += replies(&fx.observer)
                .await
                .iter()
                .filter_map(|r| report_count(r))
                .sum::<u64>();
            if reported + stats.count() == TOTAL {
                break;
            }
            assert!(Instant::now() < deadline, "only {reported} reported");
        }

        fx.broker.publish(&fx.control, Message::text("REPORT"));
        fx.broker.publish(&fx.control, Message::text("SHUTDOWN"));
        reported
    };

    let (result, reported) = futures::join!(subscriber.run(&fx.directory), driver);
    let summary = result.unwrap();
    assert_eq!(summary.reports_sent, TOTAL / 250 + 1);

    let remainder: u64 = replies(&fx.observer)
        .await
        .iter()
        .filter_map(|r| report_count(r))
        .sum();
    assert_eq!(reported + remainder, TOTAL);
    assert_eq!(stats.count(), 0);

    fx.observer_connection.close().unwrap();
}

#[compio::test]
async fn test_missing_control_topic_is_fatal() {
    let broker = InprocBroker::new();
    let directory = StaticDirectory::new()
        .bind_factory("connectionFactory", broker.factory())
        .bind_destination("topic/simple", "topic/simple")
        .unwrap();

    let err = Subscriber::new(config())
        .run(&directory)
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriberError::Lookup { ref name, .. } if name == "topic/control"));
    assert_eq!(
        broker.consumer_count(&Destination::parse("topic/simple").unwrap()),
        0
    );
}

#[compio::test]
async fn test_subscriber_runs_once() {
    let fx = fixture();
    let subscriber = Subscriber::new(config());
    subscriber.stop_handle().stop();

    let summary = subscriber.run(&fx.directory).await.unwrap();
    assert_eq!(summary.exit, ExitReason::Cancelled);

    let err = subscriber.run(&fx.directory).await.unwrap_err();
    assert!(matches!(err, SubscriberError::Config(_)));

    fx.observer_connection.close().unwrap();
}

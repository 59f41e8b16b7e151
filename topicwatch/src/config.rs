//! Subscriber configuration
//!
//! Logical names the subscriber looks up at startup, plus the timing knobs of
//! the control loop. Defaults match a stock deployment; every field can be
//! overridden with a `with_*` setter or a `TOPICWATCH_*` environment variable.

use std::time::Duration;

use crate::error::{Result, SubscriberError};

/// Default logical name of the connection factory
pub const DEFAULT_CONNECTION_FACTORY: &str = "connectionFactory";

/// Default logical name of the data topic
pub const DEFAULT_DATA_TOPIC: &str = "topic/simple";

/// Default logical name of the control topic
pub const DEFAULT_CONTROL_TOPIC: &str = "topic/control";

/// Default bounded wait for one control receive (10s)
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default pause after publishing a report (500ms)
pub const DEFAULT_REPORT_DRAIN: Duration = Duration::from_millis(500);

/// Default reply to a SHUTDOWN command
pub const DEFAULT_SHUTDOWN_ACK: &str = "SHUTDOWN is being performed";

/// Subscriber configuration.
///
/// # Examples
///
/// ```
/// use topicwatch::SubscriberConfig;
/// use std::time::Duration;
///
/// let config = SubscriberConfig::default()
///     .with_data_topic("topic/orders")
///     .with_receive_timeout(Duration::from_secs(2))
///     .with_report_drain(Duration::ZERO);
/// assert_eq!(config.control_topic, "topic/control");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberConfig {
    /// Logical name of the connection factory in the directory
    pub connection_factory: String,

    /// Logical name of the data topic
    pub data_topic: String,

    /// Logical name of the control topic
    pub control_topic: String,

    /// Bounded wait for one control receive.
    ///
    /// An elapsed wait is not a termination signal; the loop polls again.
    pub receive_timeout: Duration,

    /// Pause after publishing a report so the reply can leave before a
    /// following shutdown tears the producer down.
    /// - `Duration::ZERO` disables the pause
    pub report_drain: Duration,

    /// Text published in reply to SHUTDOWN
    pub shutdown_ack: String,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            connection_factory: DEFAULT_CONNECTION_FACTORY.to_string(),
            data_topic: DEFAULT_DATA_TOPIC.to_string(),
            control_topic: DEFAULT_CONTROL_TOPIC.to_string(),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            report_drain: DEFAULT_REPORT_DRAIN,
            shutdown_ack: DEFAULT_SHUTDOWN_ACK.to_string(),
        }
    }
}

impl SubscriberConfig {
    #[must_use]
    pub fn with_connection_factory(mut self, name: impl Into<String>) -> Self {
        self.connection_factory = name.into();
        self
    }

    #[must_use]
    pub fn with_data_topic(mut self, name: impl Into<String>) -> Self {
        self.data_topic = name.into();
        self
    }

    #[must_use]
    pub fn with_control_topic(mut self, name: impl Into<String>) -> Self {
        self.control_topic = name.into();
        self
    }

    #[must_use]
    pub const fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_report_drain(mut self, drain: Duration) -> Self {
        self.report_drain = drain;
        self
    }

    #[must_use]
    pub fn with_shutdown_ack(mut self, text: impl Into<String>) -> Self {
        self.shutdown_ack = text.into();
        self
    }

    /// Defaults overlaid with `TOPICWATCH_*` environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `TOPICWATCH_CONNECTION_FACTORY` | `connection_factory` |
    /// | `TOPICWATCH_DATA_TOPIC` | `data_topic` |
    /// | `TOPICWATCH_CONTROL_TOPIC` | `control_topic` |
    /// | `TOPICWATCH_RECEIVE_TIMEOUT_MS` | `receive_timeout` |
    /// | `TOPICWATCH_REPORT_DRAIN_MS` | `report_drain` |
    /// | `TOPICWATCH_SHUTDOWN_ACK` | `shutdown_ack` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed like [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("TOPICWATCH_CONNECTION_FACTORY") {
            config.connection_factory = v;
        }
        if let Some(v) = lookup("TOPICWATCH_DATA_TOPIC") {
            config.data_topic = v;
        }
        if let Some(v) = lookup("TOPICWATCH_CONTROL_TOPIC") {
            config.control_topic = v;
        }
        if let Some(v) = lookup("TOPICWATCH_RECEIVE_TIMEOUT_MS") {
            config.receive_timeout = parse_millis("TOPICWATCH_RECEIVE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TOPICWATCH_REPORT_DRAIN_MS") {
            config.report_drain = parse_millis("TOPICWATCH_REPORT_DRAIN_MS", &v)?;
        }
        if let Some(v) = lookup("TOPICWATCH_SHUTDOWN_ACK") {
            config.shutdown_ack = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the control loop misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.receive_timeout.is_zero() {
            return Err(SubscriberError::config(
                "receive_timeout must be greater than zero",
            ));
        }
        if self.data_topic == self.control_topic {
            return Err(SubscriberError::config(format!(
                "data and control topics must differ (both '{}')",
                self.data_topic
            )));
        }
        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| SubscriberError::config(format!("{key}='{value}': {e}")))
}

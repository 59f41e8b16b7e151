//! Decoding of inbound messages and control commands.
//!
//! Matching is exact and case-sensitive on the control topic. The data topic
//! never interprets text: a message that happens to read "SHUTDOWN" there is
//! ordinary data.

use std::fmt;

use topicwatch_core::message::Message;

/// Classification of an inbound message, decided at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// Text from the data topic
    Data(&'a str),
    /// Text from the control topic
    Command(&'a str),
    /// Non-text payload; carries nothing to act on
    Malformed,
}

impl<'a> Inbound<'a> {
    /// Decode a message delivered on the data topic.
    #[must_use]
    pub fn from_data(message: &'a Message) -> Self {
        message.as_text().map_or(Self::Malformed, Self::Data)
    }

    /// Decode a message delivered on the control topic.
    #[must_use]
    pub fn from_control(message: &'a Message) -> Self {
        message.as_text().map_or(Self::Malformed, Self::Command)
    }
}

/// Administrative command carried on the control topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Shutdown,
    Report,
    Unknown,
}

impl Command {
    pub const SHUTDOWN: &'static str = "SHUTDOWN";
    pub const REPORT: &'static str = "REPORT";

    /// Decode command text. Anything but an exact keyword is `Unknown`.
    ///
    /// # Examples
    ///
    /// ```
    /// use topicwatch::command::Command;
    ///
    /// assert_eq!(Command::decode("REPORT"), Command::Report);
    /// assert_eq!(Command::decode("SHUTDOWN now"), Command::Unknown);
    /// assert_eq!(Command::decode("report"), Command::Unknown);
    /// ```
    #[must_use]
    pub fn decode(text: &str) -> Self {
        match text {
            Self::SHUTDOWN => Self::Shutdown,
            Self::REPORT => Self::Report,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shutdown => Self::SHUTDOWN,
            Self::Report => Self::REPORT,
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(Command::decode("SHUTDOWN"), Command::Shutdown);
        assert_eq!(Command::decode("REPORT"), Command::Report);
    }

    #[test]
    fn test_no_prefix_or_case_folding() {
        assert_eq!(Command::decode("SHUTDOWN!"), Command::Unknown);
        assert_eq!(Command::decode("SHUTDOWNNOW"), Command::Unknown);
        assert_eq!(Command::decode("shutdown"), Command::Unknown);
        assert_eq!(Command::decode(" REPORT"), Command::Unknown);
        assert_eq!(Command::decode(""), Command::Unknown);
    }

    #[test]
    fn test_inbound_classification() {
        let text = Message::text("SHUTDOWN");
        let binary = Message::bytes(vec![0u8; 4]);

        assert_eq!(Inbound::from_data(&text), Inbound::Data("SHUTDOWN"));
        assert_eq!(Inbound::from_control(&text), Inbound::Command("SHUTDOWN"));
        assert_eq!(Inbound::from_data(&binary), Inbound::Malformed);
        assert_eq!(Inbound::from_control(&binary), Inbound::Malformed);
    }
}

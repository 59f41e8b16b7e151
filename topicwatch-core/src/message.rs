//! Messages exchanged over topics.
//!
//! A message carries either a text body or an opaque byte body. Only text
//! bodies have meaning to topicwatch; byte bodies are delivered but ignored
//! by consumers that expect text.

use bytes::Bytes;

use crate::destination::Destination;

/// Message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// UTF-8 text payload
    Text(String),
    /// Opaque binary payload (refcounted, cheap to clone on fan-out)
    Bytes(Bytes),
}

/// A message as delivered by the fabric.
///
/// The `id` and `destination` are stamped by the broker on publish; a
/// message built locally starts with id 0 and no destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: u64,
    destination: Option<Destination>,
    body: Body,
}

impl Message {
    /// Create a text message.
    ///
    /// # Examples
    ///
    /// ```
    /// use topicwatch_core::message::Message;
    ///
    /// let msg = Message::text("REPORT");
    /// assert_eq!(msg.as_text(), Some("REPORT"));
    /// ```
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: 0,
            destination: None,
            body: Body::Text(text.into()),
        }
    }

    /// Create a binary message.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            id: 0,
            destination: None,
            body: Body::Bytes(data.into()),
        }
    }

    /// Stamp broker-assigned delivery metadata.
    #[must_use]
    pub fn stamped(mut self, id: u64, destination: Destination) -> Self {
        self.id = id;
        self.destination = Some(destination);
        self
    }

    /// Broker-assigned id (0 if never published).
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Destination the message was published to.
    #[must_use]
    pub const fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Text content, or `None` for binary bodies.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            Body::Text(text) => Some(text),
            Body::Bytes(_) => None,
        }
    }

    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self.body, Body::Text(_))
    }
}

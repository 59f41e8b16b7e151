//! Destination naming for publish/subscribe topics.
//!
//! Topics are addressed by name. Two spellings are accepted and normalize to
//! the same destination:
//! - `topic/simple` (directory-style logical name)
//! - `topic://simple` (URI style)

use std::fmt;
use std::str::FromStr;

use crate::error::FabricError;

/// A publish/subscribe topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    name: String,
}

impl Destination {
    /// Parse a destination from a string.
    ///
    /// # Examples
    ///
    /// ```
    /// use topicwatch_core::destination::Destination;
    ///
    /// let a = Destination::parse("topic/simple").unwrap();
    /// let b = Destination::parse("topic://simple").unwrap();
    /// assert_eq!(a, b);
    /// assert_eq!(a.name(), "simple");
    /// ```
    pub fn parse(s: &str) -> Result<Self, FabricError> {
        s.parse()
    }

    /// Build a topic destination from a bare name.
    pub fn topic(name: impl Into<String>) -> Result<Self, FabricError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name })
    }

    /// The bare topic name, without scheme.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for Destination {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s
            .strip_prefix("topic://")
            .or_else(|| s.strip_prefix("topic/"))
            .ok_or_else(|| {
                FabricError::InvalidDestination(format!(
                    "{s} (expected topic/<name> or topic://<name>)"
                ))
            })?;
        Self::topic(name)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topic/{}", self.name)
    }
}

fn validate_name(name: &str) -> Result<(), FabricError> {
    if name.is_empty() {
        return Err(FabricError::InvalidDestination(
            "topic name cannot be empty".to_string(),
        ));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(FabricError::InvalidDestination(format!(
            "topic name cannot contain whitespace: '{name}'"
        )));
    }
    Ok(())
}

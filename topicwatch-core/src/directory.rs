//! Name lookup for connection factories and destinations.
//!
//! Subscribers never hard-code where their topics live. They ask a
//! [`Directory`] for a connection factory and destinations by logical name,
//! and a failed lookup aborts startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::destination::Destination;
use crate::error::{FabricError, Result};
use crate::fabric::ConnectionFactory;

/// Resolves logical names to fabric objects.
pub trait Directory {
    fn lookup_factory(&self, name: &str) -> Result<Arc<dyn ConnectionFactory>>;

    fn lookup_destination(&self, name: &str) -> Result<Destination>;
}

/// A directory populated explicitly at startup.
///
/// # Examples
///
/// ```
/// use topicwatch_core::directory::{Directory, StaticDirectory};
/// use topicwatch_core::inproc::InprocBroker;
///
/// let broker = InprocBroker::new();
/// let directory = StaticDirectory::new()
///     .bind_factory("connectionFactory", broker.factory())
///     .bind_destination("topic/simple", "topic://simple")
///     .unwrap();
///
/// assert!(directory.lookup_factory("connectionFactory").is_ok());
/// assert_eq!(directory.lookup_destination("topic/simple").unwrap().name(), "simple");
/// assert!(directory.lookup_destination("topic/other").is_err());
/// ```
#[derive(Default, Clone)]
pub struct StaticDirectory {
    factories: HashMap<String, Arc<dyn ConnectionFactory>>,
    destinations: HashMap<String, Destination>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection factory under `name`.
    #[must_use]
    pub fn bind_factory(
        mut self,
        name: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Bind `name` to the destination parsed from `destination`.
    pub fn bind_destination(mut self, name: impl Into<String>, destination: &str) -> Result<Self> {
        let destination = Destination::parse(destination)?;
        self.destinations.insert(name.into(), destination);
        Ok(self)
    }
}

impl Directory for StaticDirectory {
    fn lookup_factory(&self, name: &str) -> Result<Arc<dyn ConnectionFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| FabricError::NameNotFound(name.to_string()))
    }

    fn lookup_destination(&self, name: &str) -> Result<Destination> {
        self.destinations
            .get(name)
            .cloned()
            .ok_or_else(|| FabricError::NameNotFound(name.to_string()))
    }
}

impl std::fmt::Debug for StaticDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticDirectory")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("destinations", &self.destinations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inproc::InprocBroker;

    #[test]
    fn test_missing_factory() {
        let directory = StaticDirectory::new();
        let err = directory.lookup_factory("connectionFactory").err().unwrap();
        assert!(matches!(err, FabricError::NameNotFound(name) if name == "connectionFactory"));
    }

    #[test]
    fn test_bind_invalid_destination() {
        let result = StaticDirectory::new().bind_destination("bad", "queue/simple");
        assert!(matches!(result, Err(FabricError::InvalidDestination(_))));
    }

    #[test]
    fn test_lookup_bound_names() {
        let broker = InprocBroker::new();
        let directory = StaticDirectory::new()
            .bind_factory("f", broker.factory())
            .bind_destination("control", "topic/control")
            .unwrap();

        assert!(directory.lookup_factory("f").is_ok());
        assert_eq!(
            directory.lookup_destination("control").unwrap(),
            Destination::parse("topic/control").unwrap()
        );
    }
}

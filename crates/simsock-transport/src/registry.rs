use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::broker::BrokerShared;
use crate::error::{Result, TransportError};
use crate::sync::lock;

/// Name → broker directory shared by every broker that can reach the others.
///
/// Create one per simulated "network" and hand it to each broker. Names are
/// unique for the registry's lifetime; brokers are never removed.
#[derive(Clone, Default)]
pub struct Registry {
    brokers: Arc<Mutex<HashMap<String, Arc<BrokerShared>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a broker with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.brokers).contains_key(name)
    }

    /// Registered broker names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.brokers).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        lock(&self.brokers).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.brokers).is_empty()
    }

    pub(crate) fn register(&self, broker: Arc<BrokerShared>) -> Result<()> {
        let mut brokers = lock(&self.brokers);
        if brokers.contains_key(broker.name()) {
            return Err(TransportError::NameConflict(broker.name().to_string()));
        }
        brokers.insert(broker.name().to_string(), broker);
        Ok(())
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Arc<BrokerShared>> {
        lock(&self.brokers).get(name).cloned()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("brokers", &self.names())
            .finish()
    }
}

//! Name-keyed store of service configs.
//!
//! The embedder registers configs once, typically at start-up; calls only
//! read. Entries are handed out as [`Arc`]s so a call keeps the config it
//! resolved even if the name is re-registered meanwhile.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use partnerlink::ProtocolError;
use tracing::info;

use crate::config::ServiceConfig;

#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<ServiceConfig>>>>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `config` under its name, returning the config it replaced.
    pub fn register(&self, config: ServiceConfig) -> Option<Arc<ServiceConfig>> {
        info!("registry: registered service config {:?}", config.name);
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(config.name.clone(), Arc::new(config))
    }

    pub fn get(&self, name: &str) -> Result<Arc<ServiceConfig>, ProtocolError> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name)
            .cloned()
            .ok_or_else(|| ProtocolError::ConfigNotFound(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

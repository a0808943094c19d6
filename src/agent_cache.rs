//! Credential-keyed memoization of the remote analysis client.
//!
//! One client per credential for the life of a session: repeated analysis
//! triggers with the same key reuse the same instance, and resetting the
//! key empties the map so the next use reconstructs a client.
//!
//! Keys exist only in memory and are dropped with the map on invalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::pipeline::agent::{AgentError, GeminiAgent};

/// Mapping from credential value to a constructed client.
pub struct AgentCache {
    agents: Mutex<HashMap<String, Arc<GeminiAgent>>>,
}

impl AgentCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the memoized client for this credential, constructing it on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyCredential`] when the credential is empty.
    pub fn get_or_create(&self, credential: &str) -> Result<Arc<GeminiAgent>, AgentError> {
        let mut agents = self.agents.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(agent) = agents.get(credential) {
            return Ok(Arc::clone(agent));
        }

        let agent = Arc::new(GeminiAgent::new(credential)?);
        agents.insert(credential.to_string(), Arc::clone(&agent));
        tracing::debug!("Constructed analysis client for newly entered credential");
        Ok(agent)
    }

    /// Drop every cached client. Called on credential reset so the next
    /// use reconstructs the client.
    pub fn invalidate_all(&self) {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AgentCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_cache_is_empty() {
        let cache = AgentCache::new();
        assert!(cache.is_empty());
    }

    #[test]
    fn same_credential_reuses_the_same_client() {
        let cache = AgentCache::new();
        let first = cache.get_or_create("key-one").unwrap();
        let second = cache.get_or_create("key-one").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_credentials_get_different_clients() {
        let cache = AgentCache::new();
        let first = cache.get_or_create("key-one").unwrap();
        let second = cache.get_or_create("key-two").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn empty_credential_is_rejected() {
        let cache = AgentCache::new();
        assert!(matches!(
            cache.get_or_create(""),
            Err(AgentError::EmptyCredential)
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_forces_reconstruction() {
        let cache = AgentCache::new();
        let first = cache.get_or_create("key-one").unwrap();
        cache.invalidate_all();
        assert!(cache.is_empty());

        let rebuilt = cache.get_or_create("key-one").unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
    }

    #[test]
    fn default_matches_new() {
        assert!(AgentCache::default().is_empty());
    }
}

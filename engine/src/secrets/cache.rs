use crate::secrets::string::SecretString;
use crate::secrets::SecretManager;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// An in-memory cache for secrets retrieved from the environment or keychain.
///
/// Providers ask the cache for their key on every request, so a key stored
/// with `forge key set` while a REPL is running is picked up on the next turn
/// once `invalidate` has been called.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    /// Creates a new SecretCache wrapping the provided SecretManager
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Retrieves a secret, checking the memory cache first.
    ///
    /// Misses are looked up through the SecretManager and cached when found.
    pub fn get_secret(&self, key: &str) -> Result<Option<SecretString>, EngineError> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(secret) = cache.get(key) {
                return Ok(Some(secret.clone()));
            }
        }

        let Some(raw_secret) = self.manager.get_secret(key)? else {
            return Ok(None);
        };
        let secret = SecretString::new(raw_secret);

        self.insert(key, secret.clone());

        Ok(Some(secret))
    }

    /// Place a secret directly into the cache
    pub fn insert(&self, key: &str, secret: SecretString) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(key.to_string(), secret);
    }

    /// Forget a cached secret so the next lookup hits the SecretManager
    pub fn invalidate(&self, key: &str) {
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.remove(key);
    }

    /// Whether the secret is cached or available from the SecretManager
    pub fn has_secret(&self, key: &str) -> bool {
        matches!(self.get_secret(key), Ok(Some(_)))
    }
}

//! Provider Router
//!
//! Holds the registered providers and picks one per chat turn: the name the
//! caller asked for, or the configured default. There is no failover; an
//! unknown name is a configuration error.

use super::{AnthropicProvider, GeminiProvider, LLMProvider};
use crate::config::LLMConfig;
use crate::secrets::SecretCache;
use sdk::errors::EngineError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Selects a provider by name
pub struct ProviderRouter {
    providers: BTreeMap<String, Arc<dyn LLMProvider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create an empty router whose default is `default_provider`
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Build a router with every backend the configuration describes
    pub fn from_config(config: &LLMConfig, secret_cache: Arc<SecretCache>) -> Self {
        let mut router = Self::new(config.default_provider.clone());

        router.register(Arc::new(AnthropicProvider::new(
            config.anthropic.clone(),
            config.max_tokens,
            Arc::clone(&secret_cache),
        )));
        router.register(Arc::new(GeminiProvider::new(
            config.gemini.clone(),
            config.max_tokens,
            secret_cache,
        )));

        router
    }

    /// Register a provider under its own name, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn LLMProvider>) {
        tracing::debug!("Registered provider: {}", provider.name());
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Return the named provider, or the default when `name` is `None`
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ProviderNotConfigured` for unknown names.
    pub fn select(&self, name: Option<&str>) -> Result<Arc<dyn LLMProvider>, EngineError> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.default_provider);

        self.providers
            .get(&name.to_lowercase())
            .map(Arc::clone)
            .ok_or_else(|| EngineError::ProviderNotConfigured(name.to_string()))
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Check the health of all registered providers
    /// Returns a list of (provider_name, is_healthy)
    pub async fn check_health(&self) -> Vec<(String, bool)> {
        let mut results = Vec::new();
        for (name, provider) in &self.providers {
            let is_healthy = provider.check_health().await;
            results.push((name.clone(), is_healthy));
        }
        results
    }
}

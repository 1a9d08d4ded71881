//! Name-keyed provider registry.
//!
//! The configured [`Config::provider`][crate::config::Config::provider] name is resolved once, at
//! startup. An unknown name is a fatal configuration error rather than a per-request failure.
use crate::config::Config;
use crate::error::Error;
use crate::provider::{DynProvider, LocalProvider};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a provider from the process configuration.
#[async_trait::async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn build(&self, config: &Config) -> Result<DynProvider, Error>;
}

/// Maps provider names to the factories that build them.
pub struct ProviderRegistry {
    factories: BTreeMap<String, Box<dyn ProviderFactory>>,
}

impl Default for ProviderRegistry {
    /// A registry holding the built-in providers.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("local", LocalFactory);
        registry
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any factory previously registered with it.
    pub fn register(&mut self, name: &str, factory: impl ProviderFactory + 'static) {
        self.factories
            .insert(name.to_ascii_lowercase(), Box::new(factory));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the provider registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProvider`] if no factory is registered under `name`, or whatever
    /// error the factory fails with.
    pub async fn resolve(&self, name: &str, config: &Config) -> Result<DynProvider, Error> {
        let factory = self
            .factories
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))?;
        factory.build(config).await
    }
}

struct LocalFactory;

#[async_trait::async_trait]
impl ProviderFactory for LocalFactory {
    async fn build(&self, config: &Config) -> Result<DynProvider, Error> {
        let provider = match &config.provider_state_path {
            Some(path) => LocalProvider::persistent(&config.zones, path).await?,
            None => LocalProvider::new(&config.zones)?,
        };
        Ok(Arc::new(provider))
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use super::Provider;
use crate::SessionError;

/// Named providers available to session managers.
///
/// Build one at startup, register providers into it and pass it to
/// [`SessionManager::new`](crate::SessionManager::new). Each manager looks
/// up exactly one provider by name.
///
/// # Example
///
/// ```rust,ignore
/// use latchkey::provider::{MemoryProvider, ProviderRegistry};
///
/// let mut registry = ProviderRegistry::new();
/// registry.register("memory", MemoryProvider::new()).await?;
///
/// assert!(registry.get("memory").is_ok());
/// assert!(registry.get("redis").is_err());
/// ```
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes `provider` and registers it under `name`.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidProviderName` if `name` is empty
    /// - `SessionError::DuplicateProviderRegistration` if `name` is taken
    pub async fn register<P>(&mut self, name: &str, provider: P) -> Result<(), SessionError>
    where
        P: Provider + 'static,
    {
        self.register_shared(name, Arc::new(provider)).await
    }

    /// Same as [`register`](Self::register) for a provider that is already shared.
    pub async fn register_shared(
        &mut self,
        name: &str,
        provider: Arc<dyn Provider>,
    ) -> Result<(), SessionError> {
        if name.is_empty() {
            return Err(SessionError::InvalidProviderName);
        }
        if self.providers.contains_key(name) {
            log::warn!(target: "latchkey", "msg=\"duplicate provider registration\" provider=\"{name}\"");
            return Err(SessionError::DuplicateProviderRegistration(name.to_owned()));
        }

        provider.init().await;
        self.providers.insert(name.to_owned(), provider);

        log::debug!(target: "latchkey", "msg=\"provider registered\" provider=\"{name}\"");
        Ok(())
    }

    /// Looks up a registered provider.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, SessionError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| SessionError::ProviderNotRegistered(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

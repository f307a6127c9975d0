//! API key storage
//!
//! The key is resolved from the config file first, then the
//! `TRAVAI_API_KEY` environment variable (already folded into the config by
//! [`crate::config::Config::load`]), and finally the system keyring.

use crate::config::Config;
use crate::error::{Result, TravaiError};

/// Keyring service name
pub const KEYRING_SERVICE: &str = "travai";
/// Keyring account holding the API key
pub const KEYRING_USER: &str = "api_key";

/// Reads and writes the API key in the system keyring
#[derive(Debug, Clone)]
pub struct KeyStore {
    service: String,
    user: String,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_USER)
    }
}

impl KeyStore {
    /// Creates a store for a specific keyring entry
    pub fn new(service: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            user: user.into(),
        }
    }

    /// Returns the stored key, or `None` if nothing (or an empty value) is stored
    pub fn load(&self) -> Result<Option<String>> {
        let entry = keyring::Entry::new(&self.service, &self.user)?;
        match entry.get_password() {
            Ok(key) if key.trim().is_empty() => Ok(None),
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores `key`
    pub fn store(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(TravaiError::Credentials("API key must not be empty".to_string()).into());
        }
        let entry = keyring::Entry::new(&self.service, &self.user)?;
        entry.set_password(key)?;
        tracing::info!("Stored API key in keyring");
        Ok(())
    }

    /// Clears the stored key (best-effort)
    pub fn clear(&self) -> Result<()> {
        match keyring::Entry::new(&self.service, &self.user) {
            Ok(entry) => {
                if let Err(e) = entry.set_password("") {
                    tracing::warn!("Failed to clear stored API key: {}", e);
                } else {
                    tracing::info!("Cleared stored API key");
                }
            }
            Err(e) => {
                tracing::warn!("Keyring not available while clearing API key: {}", e);
            }
        }
        Ok(())
    }
}

/// Resolves the API key for `config`
///
/// A keyring failure is logged and treated as "no key"; the server will then
/// answer with an authorization error the user can act on.
pub fn resolve_api_key(config: &Config, store: &KeyStore) -> Option<String> {
    if let Some(key) = config
        .server
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(key.to_string());
    }

    match store.load() {
        Ok(key) => key,
        Err(e) => {
            tracing::warn!("Could not read API key from keyring: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_key_wins() {
        let mut config = Config::default();
        config.server.api_key = Some("  from-config ".to_string());
        let store = KeyStore::new("travai-test-unused", "api_key");
        assert_eq!(
            resolve_api_key(&config, &store).as_deref(),
            Some("from-config")
        );
    }

    #[test]
    fn test_store_rejects_empty_key() {
        let store = KeyStore::new("travai-test-unused", "api_key");
        let err = store.store("   ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TravaiError>(),
            Some(TravaiError::Credentials(_))
        ));
    }
}

use crate::secrets::SecretManager;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Sensitive string that never prints its value.
///
/// `Debug` and `Display` both render `[REDACTED]`; use `expose()` to read it.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// In-memory cache in front of [`SecretManager`], shared by every provider.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A cache pre-filled with fixed values, used when keys come from elsewhere
    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = values
            .into_iter()
            .map(|(k, v)| (k.to_string(), SecretString::new(v)))
            .collect();
        Self {
            manager: Arc::new(SecretManager::keychain_only(super::DEFAULT_SERVICE)),
            cache: Arc::new(RwLock::new(map)),
        }
    }

    /// Retrieves a secret, consulting the manager on a cache miss
    pub fn get_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| EngineError::KeyringError("secret cache poisoned".to_string()))?;
            if let Some(secret) = cache.get(key) {
                return Ok(secret.clone());
            }
        }

        let secret = SecretString::new(self.manager.get_secret(key)?);

        self.cache
            .write()
            .map_err(|_| EngineError::KeyringError("secret cache poisoned".to_string()))?
            .insert(key.to_string(), secret.clone());

        Ok(secret)
    }

    /// Resolve every key up front so a missing one fails before the run starts
    pub fn preload(&self, keys: &[&str]) -> Result<(), EngineError> {
        for key in keys {
            self.get_secret(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_redacts() {
        let secret = SecretString::new("hunter2");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_prefilled_cache_hits() {
        let cache = SecretCache::with_values([("serper_api_key", "abc")]);
        assert_eq!(cache.get_secret("serper_api_key").unwrap().expose(), "abc");
        assert!(cache.preload(&["serper_api_key"]).is_ok());
    }
}

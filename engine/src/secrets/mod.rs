//! API key resolution and secret scrubbing
//!
//! Keys are looked up in the environment first (`SERPER_API_KEY`,
//! `OPENAI_API_KEY`, ...) and then in the OS keychain under the
//! `deepsearch` service. Lookups never prompt: a missing key is a
//! configuration error surfaced before any research starts.

pub mod cache;

pub use cache::{SecretCache, SecretString};

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// Keychain service name used when none is given
pub const DEFAULT_SERVICE: &str = "deepsearch";

/// Resolves secrets from the environment and the OS keychain.
///
/// Secrets live in:
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service (libsecret)
pub struct SecretManager {
    service_name: String,
    /// Consult environment variables before the keychain
    read_env: bool,
}

/// Regex patterns for detecting common secret formats.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Patterns match:
/// - OpenAI / Anthropic keys: sk-..., sk-ant-...
/// - Google API keys: AIza...
/// - Firecrawl keys: fc-...
/// - Bearer tokens
/// - `key=` query parameters (Gemini puts the key in the URL)
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        [
            r"sk-[a-zA-Z0-9\-_]{20,}",
            r"AIza[0-9A-Za-z\-_]{35}",
            r"fc-[a-zA-Z0-9]{20,}",
            r"Bearer\s+[^\s]{20,}",
            r"key=[A-Za-z0-9\-_]{16,}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace anything that looks like a credential with `[REDACTED]`
///
/// ```
/// use deepsearch_engine::secrets::scrub_secrets;
///
/// let scrubbed = scrub_secrets("401 for key sk-1234567890abcdefghij");
/// assert_eq!(scrubbed, "401 for key [REDACTED]");
/// ```
pub fn scrub_secrets(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }
    result
}

/// Environment variable consulted for a secret key, e.g. `serper_api_key` → `SERPER_API_KEY`
pub fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase()
}

impl SecretManager {
    /// Creates a new SecretManager with the given keychain service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            read_env: true,
        }
    }

    /// A manager that only consults the keychain
    pub fn keychain_only(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            read_env: false,
        }
    }

    /// Retrieves a secret.
    ///
    /// # Errors
    /// `EngineError::Config` when the secret is set nowhere,
    /// `EngineError::KeyringError` when the keychain itself fails.
    pub fn get_secret(&self, key: &str) -> Result<String, EngineError> {
        if self.read_env {
            if let Ok(value) = std::env::var(env_var_name(key)) {
                if !value.trim().is_empty() {
                    tracing::debug!("Resolved secret '{}' from environment", key);
                    return Ok(value.trim().to_string());
                }
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(EngineError::Config(format!(
                "Secret '{}' is not configured. Set {} or store it in the keychain",
                key,
                env_var_name(key)
            ))),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Stores a secret in the OS keychain.
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::Config("Secret cannot be empty".to_string()));
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Deletes a secret from the OS keychain.
    pub fn delete_secret(&self, key: &str) -> Result<(), EngineError> {
        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.delete_password().map_err(|e| {
            EngineError::KeyringError(format!("Failed to delete secret '{}': {}", key, e))
        })?;

        tracing::info!("Deleted secret '{}' from keychain", key);
        Ok(())
    }

    /// Whether the secret can be resolved without error
    pub fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key).is_ok()
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

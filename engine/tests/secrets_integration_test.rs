use deepsearch_engine::secrets::{scrub_secrets, SecretCache, SecretManager};
use std::sync::Arc;

#[test]
fn test_environment_takes_precedence_over_keychain() {
    std::env::set_var("DEEPSEARCH_IT_SERPER_KEY", "env-value-123");
    let cache = SecretCache::new(Arc::new(SecretManager::new("deepsearch-integration-test")));

    let secret = cache
        .get_secret("deepsearch_it_serper_key")
        .expect("env secret should resolve");
    assert_eq!(secret.expose(), "env-value-123");

    // Cached: removing the variable does not change the resolved value
    std::env::remove_var("DEEPSEARCH_IT_SERPER_KEY");
    let again = cache.get_secret("deepsearch_it_serper_key").unwrap();
    assert_eq!(again.expose(), "env-value-123");
}

#[test]
fn test_keychain_round_trip() {
    if std::env::var("CI").is_ok() {
        return; // Skip: no keyring in CI
    }
    let manager = SecretManager::keychain_only("deepsearch-integration-test");
    let key = "test_api_key_integration";

    if manager.set_secret(key, "fc-test123456789").is_err() {
        return; // No keychain backend on this machine
    }
    let retrieved = manager.get_secret(key).expect("Failed to retrieve secret");
    assert_eq!(retrieved, "fc-test123456789");

    manager.delete_secret(key).expect("Failed to delete secret");
}

#[test]
fn test_provider_error_text_is_scrubbed() {
    let error = "upstream said: invalid key sk-proj-abcdefghijklmnopqrstuvwxyz0123";
    let scrubbed = scrub_secrets(error);
    assert!(!scrubbed.contains("sk-proj"));
    assert!(scrubbed.contains("[REDACTED]"));
}

//! Wires configuration into the running components.

use crate::access::TokenAccess;
use crate::api::AppState;
use crate::config::{BackendKind, StoreConfig, VaultConfig};
use crate::credentials::{kdf, MemoryBackend, SecretBackend, SecretStore, SqliteBackend};
use crate::error::VaultError;
use crate::oauth::{AuthorizationStates, ProviderConfig, TokenClient};
use crate::refresh::RefreshCoordinator;
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use std::sync::Arc;
use tracing::{info, warn};

/// Returns the configured master secret.
///
/// An unset secret is fatal unless `allow_dev_secret` is on, in which case a
/// random per-process secret is generated.
pub fn resolve_master_secret(config: &StoreConfig) -> Result<String, VaultError> {
    if !config.master_secret.trim().is_empty() {
        return Ok(config.master_secret.clone());
    }

    if !config.allow_dev_secret {
        return Err(VaultError::Configuration(
            "master secret is not set (CREDVAULT_MASTER_SECRET)".to_string(),
        ));
    }

    warn!(
        "No master secret configured; using an ephemeral development secret. \
         Stored tokens will be unreadable after restart"
    );
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Ok(STANDARD.encode(bytes))
}

/// Derives the encryption key and opens the configured backend.
pub fn open_store(config: &StoreConfig) -> Result<SecretStore, VaultError> {
    let master_secret = resolve_master_secret(config)?;
    let key = kdf::derive(&master_secret, config.kdf_salt.as_bytes(), &config.kdf)?;

    let backend: Arc<dyn SecretBackend> = match config.backend {
        BackendKind::Memory => {
            info!("Using in-memory secret backend");
            Arc::new(MemoryBackend::new())
        }
        BackendKind::Sqlite => {
            info!(db_path = %config.db_path, "Using SQLite secret backend");
            Arc::new(SqliteBackend::open(&config.db_path).map_err(VaultError::storage)?)
        }
    };

    Ok(SecretStore::new(backend, key))
}

/// Builds the shared application state. Rejects configurations that fail
/// [`VaultConfig::validate`].
pub fn build_state(config: &VaultConfig) -> Result<AppState, VaultError> {
    config.validate()?;
    let store = Arc::new(open_store(&config.vault)?);

    let provider = ProviderConfig::from_config(&config.oauth);
    let client = TokenClient::new(
        provider.clone(),
        std::time::Duration::from_secs(config.oauth.request_timeout_seconds),
        chrono::Duration::seconds(config.oauth.default_expires_in_seconds),
    )?;

    let coordinator = Arc::new(RefreshCoordinator::new(
        store,
        client,
        chrono::Duration::seconds(config.oauth.refresh_buffer_seconds),
    ));

    Ok(AppState {
        access: Arc::new(TokenAccess::new(coordinator)),
        states: AuthorizationStates::new(config.oauth.state_expiry_seconds),
        provider,
        callback_base_url: config.server.callback_base_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::KdfParams;

    fn store_config() -> StoreConfig {
        StoreConfig {
            kdf: KdfParams {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        let err = resolve_master_secret(&store_config()).unwrap_err();
        assert!(matches!(err, VaultError::Configuration(_)));

        let mut config = store_config();
        config.master_secret = "   ".to_string();
        assert!(matches!(
            open_store(&config),
            Err(VaultError::Configuration(_))
        ));
    }

    #[test]
    fn test_dev_secret_is_random_per_call() {
        let mut config = store_config();
        config.allow_dev_secret = true;

        let first = resolve_master_secret(&config).unwrap();
        let second = resolve_master_secret(&config).unwrap();
        assert!(!first.is_empty());
        assert_ne!(first, second);
    }

    #[test]
    fn test_configured_secret_wins_over_dev_secret() {
        let mut config = store_config();
        config.master_secret = "configured".to_string();
        config.allow_dev_secret = true;

        assert_eq!(resolve_master_secret(&config).unwrap(), "configured");
    }

    #[test]
    fn test_build_state_with_memory_backend() {
        let mut config = VaultConfig::default();
        config.vault = store_config();
        config.vault.master_secret = "a long master secret".to_string();
        config.oauth.client_id = "cid".to_string();
        config.oauth.client_secret = "csecret".to_string();
        config.server.callback_base_url = "https://vault.example.com/".to_string();

        let state = build_state(&config).unwrap();
        assert_eq!(
            state.redirect_uri(),
            "https://vault.example.com/api/calendar/oauth/callback"
        );
        assert!(state.states.is_empty());
    }

    #[test]
    fn test_build_state_rejects_oversized_refresh_buffer() {
        let mut config = VaultConfig::default();
        config.vault = store_config();
        config.vault.master_secret = "a long master secret".to_string();
        config.oauth.client_id = "cid".to_string();
        config.oauth.client_secret = "csecret".to_string();
        config.oauth.refresh_buffer_seconds = i64::MAX;

        assert!(matches!(
            build_state(&config),
            Err(VaultError::Configuration(_))
        ));
    }
}

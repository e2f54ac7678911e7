//! Error taxonomy for the credential vault.
//!
//! Only [`VaultError::Configuration`] is allowed to halt startup. Decryption and
//! storage failures are converted to absence at the secret store boundary, and
//! refresh failures surface to callers as "reconnect required".

/// Vault errors
#[derive(Debug, Clone, PartialEq)]
pub enum VaultError {
    /// Missing or invalid master secret, client credentials or endpoint
    Configuration(String),
    /// Ciphertext could not be authenticated (tampered, truncated or wrong key)
    Decryption(String),
    /// Backend read/write failure
    Storage(String),
    /// Token endpoint unreachable, non-2xx, or malformed body
    RefreshFailure(String),
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            VaultError::Decryption(msg) => write!(f, "Decryption error: {}", msg),
            VaultError::Storage(msg) => write!(f, "Storage error: {}", msg),
            VaultError::RefreshFailure(msg) => write!(f, "Token refresh failed: {}", msg),
        }
    }
}

impl std::error::Error for VaultError {}

impl VaultError {
    /// Wraps a backend error, keeping the full context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        VaultError::Storage(format!("{:#}", err))
    }
}

//! Argon2id key derivation for the secret store.
//!
//! The encryption key is never stored. It is recomputed deterministically from
//! the configured master secret and a fixed salt every time a store is opened,
//! so records written by one process can be read back by the next.

use crate::error::VaultError;
use argon2::{Algorithm, Argon2, Params, Version};
use serde::Deserialize;

/// Size of the derived key in bytes (256 bits, AES-256)
pub const KEY_SIZE: usize = 32;

/// Salt used when the configuration does not override it
pub const DEFAULT_SALT: &str = "credvault/secret-store/v1";

/// Argon2 rejects salts shorter than this
const MIN_SALT_LEN: usize = 8;

/// Symmetric key derived from the master secret.
///
/// Read-only after derivation and safe to share across threads. `Debug` is
/// redacted so the key never reaches a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Wraps raw key bytes (used by tests and tooling that already hold a key).
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    /// Number of passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    19_456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

/// Derives the store's encryption key from a master secret and salt.
///
/// # Errors
/// * `Configuration` - empty master secret, salt shorter than 8 bytes, or
///   cost parameters Argon2 rejects
pub fn derive(master_secret: &str, salt: &[u8], params: &KdfParams) -> Result<EncryptionKey, VaultError> {
    if master_secret.is_empty() {
        return Err(VaultError::Configuration(
            "master secret must not be empty".to_string(),
        ));
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(VaultError::Configuration(format!(
            "key derivation salt must be at least {} bytes, got {}",
            MIN_SALT_LEN,
            salt.len()
        )));
    }

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| VaultError::Configuration(format!("invalid Argon2 parameters: {}", e)))?;

    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; KEY_SIZE];
    argon
        .hash_password_into(master_secret.as_bytes(), salt, &mut key)
        .map_err(|e| VaultError::Configuration(format!("key derivation failed: {}", e)))?;

    Ok(EncryptionKey(key))
}

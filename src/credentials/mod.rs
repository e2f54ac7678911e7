//! Encrypted secret storage for OAuth tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       SecretStore                        │
//! │  - store / get / revoke                  │
//! │  - decrypt failures read as absence      │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       encryption + kdf                   │
//! │  - AES-256-GCM, fresh nonce per call     │
//! │  - Argon2id key from master secret       │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SecretBackend                      │
//! │  - MemoryBackend (DashMap)               │
//! │  - SqliteBackend (durable)               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use credvault::credentials::{kdf, SecretStore};
//!
//! # fn main() -> Result<(), credvault::VaultError> {
//! let key = kdf::derive("long master secret", kdf::DEFAULT_SALT.as_bytes(), &Default::default())?;
//! let store = SecretStore::in_memory(key);
//!
//! store.store("user1", "calendar_refresh_token", "1//0g-refresh")?;
//! assert!(store.get("user1", "calendar_refresh_token").is_some());
//!
//! store.revoke("user1", "calendar_refresh_token")?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod backend;
pub mod encryption;
pub mod kdf;
mod storage;

pub use backend::{MemoryBackend, SecretBackend, SqliteBackend};
pub use kdf::{EncryptionKey, KdfParams};
pub use storage::SecretStore;

/// One sealed secret as held by a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct SecretRecord {
    pub subject_id: String,
    pub name: String,
    /// AES-256-GCM output including the tag
    pub ciphertext: Vec<u8>,
    /// 96-bit nonce used for this ciphertext
    pub nonce: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Record timestamps, safe to expose.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SecretMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

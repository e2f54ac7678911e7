//! Encrypted secret store.
//!
//! Seals plaintext with the store's derived key before it reaches a backend and
//! opens it again on the way out. Read failures of any kind (backend error,
//! tampered ciphertext, key mismatch) are logged here and reported to callers
//! as absence.

use super::backend::{MemoryBackend, SecretBackend};
use super::kdf::EncryptionKey;
use super::{encryption, SecretMetadata};
use crate::error::VaultError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Keyed store of encrypted secrets, identified by `(subject_id, name)`.
///
/// Constructed explicitly and shared by handle (`Arc<SecretStore>`); there is
/// no process-wide instance.
pub struct SecretStore {
    backend: Arc<dyn SecretBackend>,
    key: EncryptionKey,
}

impl SecretStore {
    pub fn new(backend: Arc<dyn SecretBackend>, key: EncryptionKey) -> Self {
        Self { backend, key }
    }

    /// Store backed by process memory only.
    pub fn in_memory(key: EncryptionKey) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), key)
    }

    /// Encrypts and stores a secret, replacing any prior value.
    ///
    /// The ciphertext is complete before the backend is touched, so concurrent
    /// writers to the same key never interleave: the last completed write wins.
    pub fn store(&self, subject_id: &str, name: &str, plaintext: impl AsRef<[u8]>) -> Result<(), VaultError> {
        let (ciphertext, nonce) = encryption::encrypt(plaintext.as_ref(), &self.key)?;

        self.backend
            .upsert(subject_id, name, ciphertext, nonce, Utc::now())
            .map_err(VaultError::storage)?;

        debug!(subject = %subject_id, name = %name, "Secret stored");
        Ok(())
    }

    /// Returns the decrypted secret, or `None` when absent or unreadable.
    pub fn get(&self, subject_id: &str, name: &str) -> Option<Vec<u8>> {
        let record = match self.backend.fetch_and_touch(subject_id, name, Utc::now()) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                error!(subject = %subject_id, name = %name, error = %format!("{:#}", e), "Failed to read secret");
                return None;
            }
        };

        match encryption::decrypt(&record.ciphertext, &record.nonce, &self.key) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                warn!(subject = %subject_id, name = %name, error = %e, "Stored secret could not be decrypted, treating as absent");
                None
            }
        }
    }

    /// Like [`get`](Self::get) for secrets that hold UTF-8 text.
    pub fn get_string(&self, subject_id: &str, name: &str) -> Option<String> {
        let bytes = self.get(subject_id, name)?;
        match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(_) => {
                warn!(subject = %subject_id, name = %name, "Stored secret is not valid UTF-8, treating as absent");
                None
            }
        }
    }

    /// Removes a secret. Removing a missing key is not an error.
    pub fn revoke(&self, subject_id: &str, name: &str) -> Result<(), VaultError> {
        let existed = self
            .backend
            .remove(subject_id, name)
            .map_err(VaultError::storage)?;

        debug!(subject = %subject_id, name = %name, existed, "Secret revoked");
        Ok(())
    }

    /// Timestamps of a record, without decrypting it or touching `last_used_at`.
    pub fn metadata(&self, subject_id: &str, name: &str) -> Option<SecretMetadata> {
        match self.backend.peek(subject_id, name) {
            Ok(record) => record.map(|r| SecretMetadata {
                name: r.name,
                created_at: r.created_at,
                last_used_at: r.last_used_at,
            }),
            Err(e) => {
                error!(subject = %subject_id, name = %name, error = %format!("{:#}", e), "Failed to read secret metadata");
                None
            }
        }
    }

    /// Names of all secrets held for a subject.
    pub fn list_names(&self, subject_id: &str) -> Result<Vec<String>, VaultError> {
        self.backend.list_names(subject_id).map_err(VaultError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::backend::SqliteBackend;
    use std::thread;
    use std::time::Duration;

    fn create_test_store() -> SecretStore {
        SecretStore::in_memory(EncryptionKey::from_bytes([0u8; 32]))
    }

    #[test]
    fn test_store_and_get() {
        let store = create_test_store();

        store.store("user1", "calendar_access_token", "ya29.token").expect("Failed to store");

        let retrieved = store.get_string("user1", "calendar_access_token");
        assert_eq!(retrieved.as_deref(), Some("ya29.token"));
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get("user1", "calendar_access_token").is_none());
    }

    #[test]
    fn test_store_overwrites() {
        let store = create_test_store();

        store.store("user1", "token", "first").unwrap();
        store.store("user1", "token", "second").unwrap();

        assert_eq!(store.get_string("user1", "token").as_deref(), Some("second"));
        assert_eq!(store.list_names("user1").unwrap(), vec!["token"]);
    }

    #[test]
    fn test_keys_are_isolated() {
        let store = create_test_store();

        store.store("user1", "token", "one").unwrap();
        store.store("user2", "token", "two").unwrap();
        store.store("user1", "other", "three").unwrap();

        assert_eq!(store.get_string("user1", "token").as_deref(), Some("one"));
        assert_eq!(store.get_string("user2", "token").as_deref(), Some("two"));
        assert_eq!(store.get_string("user1", "other").as_deref(), Some("three"));
    }

    #[test]
    fn test_created_at_kept_and_last_used_refreshed() {
        let store = create_test_store();

        store.store("user1", "token", "v1").unwrap();
        let first = store.metadata("user1", "token").unwrap();

        thread::sleep(Duration::from_millis(5));
        store.store("user1", "token", "v2").unwrap();
        let second = store.metadata("user1", "token").unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.last_used_at > first.last_used_at);

        thread::sleep(Duration::from_millis(5));
        store.get("user1", "token").unwrap();
        let third = store.metadata("user1", "token").unwrap();
        assert_eq!(third.created_at, first.created_at);
        assert!(third.last_used_at > second.last_used_at);
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let store = create_test_store();
        store.store("user1", "token", "secret").unwrap();

        store.revoke("user1", "token").unwrap();
        assert!(store.get("user1", "token").is_none());

        store.revoke("user1", "token").unwrap();
        assert!(store.get("user1", "token").is_none());
        assert!(store.list_names("user1").unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_reads_as_absent() {
        let backend: Arc<dyn SecretBackend> = Arc::new(MemoryBackend::new());
        let writer = SecretStore::new(Arc::clone(&backend), EncryptionKey::from_bytes([1u8; 32]));
        let reader = SecretStore::new(Arc::clone(&backend), EncryptionKey::from_bytes([2u8; 32]));

        writer.store("user1", "token", "secret").unwrap();

        assert!(reader.get("user1", "token").is_none());
        // Record is left in place; only the reader cannot open it
        assert!(writer.get("user1", "token").is_some());
    }

    #[test]
    fn test_tampered_record_reads_as_absent() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SecretStore::new(backend.clone(), EncryptionKey::from_bytes([0u8; 32]));
        store.store("user1", "token", "secret").unwrap();

        let mut record = backend.peek("user1", "token").unwrap().unwrap();
        record.ciphertext[0] ^= 0x01;
        backend
            .upsert("user1", "token", record.ciphertext, record.nonce, Utc::now())
            .unwrap();

        assert!(store.get("user1", "token").is_none());
    }

    #[test]
    fn test_concurrent_stores_last_write_wins_intact() {
        let store = Arc::new(create_test_store());
        let values: Vec<String> = (0..16).map(|i| format!("token-value-{:02}-{}", i, "x".repeat(i * 10))).collect();

        thread::scope(|scope| {
            for value in &values {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for _ in 0..20 {
                        store.store("user1", "token", value).unwrap();
                    }
                });
            }
        });

        let stored = store.get_string("user1", "token").expect("value missing");
        assert!(values.contains(&stored), "interleaved value: {}", stored);
    }

    #[test]
    fn test_sqlite_backed_store() {
        let backend = Arc::new(SqliteBackend::open(":memory:").unwrap());
        let store = SecretStore::new(backend, EncryptionKey::from_bytes([9u8; 32]));

        store.store("user1", "token", "persisted").unwrap();
        assert_eq!(store.get_string("user1", "token").as_deref(), Some("persisted"));

        store.revoke("user1", "token").unwrap();
        assert!(store.get("user1", "token").is_none());
    }
}

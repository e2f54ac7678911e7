//! Storage backends for sealed secret records.
//!
//! Backends only ever see ciphertext. Each operation on a single
//! `(subject_id, name)` key is atomic: the in-memory backend relies on the
//! per-shard write lock of `DashMap`, the SQLite backend on a connection mutex.

use super::SecretRecord;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Keyed storage of encrypted records.
pub trait SecretBackend: Send + Sync {
    /// Inserts or overwrites the record for `(subject_id, name)`.
    ///
    /// `created_at` is set only when no record existed; `last_used_at` is
    /// always set to `now`.
    fn upsert(
        &self,
        subject_id: &str,
        name: &str,
        ciphertext: Vec<u8>,
        nonce: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns the record after setting its `last_used_at` to `now`.
    fn fetch_and_touch(&self, subject_id: &str, name: &str, now: DateTime<Utc>) -> Result<Option<SecretRecord>>;

    /// Returns the record without touching it.
    fn peek(&self, subject_id: &str, name: &str) -> Result<Option<SecretRecord>>;

    /// Removes the record. Returns whether one existed.
    fn remove(&self, subject_id: &str, name: &str) -> Result<bool>;

    /// Names of all records held for a subject, sorted.
    fn list_names(&self, subject_id: &str) -> Result<Vec<String>>;
}

/// Process-local backend for tests and development.
#[derive(Default)]
pub struct MemoryBackend {
    records: DashMap<(String, String), SecretRecord>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(subject_id: &str, name: &str) -> (String, String) {
        (subject_id.to_string(), name.to_string())
    }
}

impl SecretBackend for MemoryBackend {
    fn upsert(
        &self,
        subject_id: &str,
        name: &str,
        ciphertext: Vec<u8>,
        nonce: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self.records.entry(Self::key(subject_id, name)) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.ciphertext = ciphertext;
                record.nonce = nonce;
                record.last_used_at = now;
            }
            Entry::Vacant(entry) => {
                entry.insert(SecretRecord {
                    subject_id: subject_id.to_string(),
                    name: name.to_string(),
                    ciphertext,
                    nonce,
                    created_at: now,
                    last_used_at: now,
                });
            }
        }
        Ok(())
    }

    fn fetch_and_touch(&self, subject_id: &str, name: &str, now: DateTime<Utc>) -> Result<Option<SecretRecord>> {
        Ok(self
            .records
            .get_mut(&Self::key(subject_id, name))
            .map(|mut record| {
                record.last_used_at = now;
                record.clone()
            }))
    }

    fn peek(&self, subject_id: &str, name: &str) -> Result<Option<SecretRecord>> {
        Ok(self
            .records
            .get(&Self::key(subject_id, name))
            .map(|record| record.clone()))
    }

    fn remove(&self, subject_id: &str, name: &str) -> Result<bool> {
        Ok(self.records.remove(&Self::key(subject_id, name)).is_some())
    }

    fn list_names(&self, subject_id: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == subject_id)
            .map(|entry| entry.key().1.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Durable backend using SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE secrets (
///     id INTEGER PRIMARY KEY,
///     subject_id TEXT NOT NULL,
///     name TEXT NOT NULL,
///     ciphertext TEXT NOT NULL,   -- base64
///     nonce TEXT NOT NULL,        -- base64
///     created_at TEXT NOT NULL,   -- RFC 3339
///     last_used_at TEXT NOT NULL, -- RFC 3339
///     UNIQUE(subject_id, name)
/// );
/// ```
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

/// Raw column values of one row, decoded outside the rusqlite closure.
type RawRow = (String, String, String, String, String, String);

impl SqliteBackend {
    /// Opens (or creates) the database and ensures the table exists.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open secret database at {}", path.display()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS secrets (
                id INTEGER PRIMARY KEY,
                subject_id TEXT NOT NULL,
                name TEXT NOT NULL,
                ciphertext TEXT NOT NULL,
                nonce TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_used_at TEXT NOT NULL,
                UNIQUE(subject_id, name)
            );
            "#,
        )
        .context("Failed to create secrets table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("secret database lock poisoned"))
    }

    fn select(conn: &Connection, subject_id: &str, name: &str) -> Result<Option<SecretRecord>> {
        let raw: Option<RawRow> = conn
            .query_row(
                r#"
                SELECT subject_id, name, ciphertext, nonce, created_at, last_used_at
                FROM secrets
                WHERE subject_id = ?1 AND name = ?2
                "#,
                params![subject_id, name],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query secret")?;

        raw.map(decode_row).transpose()
    }
}

fn decode_row(raw: RawRow) -> Result<SecretRecord> {
    let (subject_id, name, ciphertext, nonce, created_at, last_used_at) = raw;
    Ok(SecretRecord {
        ciphertext: BASE64.decode(ciphertext).context("Failed to decode ciphertext")?,
        nonce: BASE64.decode(nonce).context("Failed to decode nonce")?,
        created_at: parse_timestamp(&created_at).context("Failed to parse created_at")?,
        last_used_at: parse_timestamp(&last_used_at).context("Failed to parse last_used_at")?,
        subject_id,
        name,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

impl SecretBackend for SqliteBackend {
    fn upsert(
        &self,
        subject_id: &str,
        name: &str,
        ciphertext: Vec<u8>,
        nonce: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let now = now.to_rfc3339();
        self.lock()?
            .execute(
                r#"
                INSERT INTO secrets (subject_id, name, ciphertext, nonce, created_at, last_used_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(subject_id, name) DO UPDATE SET
                    ciphertext = excluded.ciphertext,
                    nonce = excluded.nonce,
                    last_used_at = excluded.last_used_at
                "#,
                params![
                    subject_id,
                    name,
                    BASE64.encode(&ciphertext),
                    BASE64.encode(&nonce),
                    now,
                ],
            )
            .context("Failed to store secret")?;
        Ok(())
    }

    fn fetch_and_touch(&self, subject_id: &str, name: &str, now: DateTime<Utc>) -> Result<Option<SecretRecord>> {
        let conn = self.lock()?;
        let touched = conn
            .execute(
                "UPDATE secrets SET last_used_at = ?3 WHERE subject_id = ?1 AND name = ?2",
                params![subject_id, name, now.to_rfc3339()],
            )
            .context("Failed to touch secret")?;
        if touched == 0 {
            return Ok(None);
        }
        Self::select(&conn, subject_id, name)
    }

    fn peek(&self, subject_id: &str, name: &str) -> Result<Option<SecretRecord>> {
        let conn = self.lock()?;
        Self::select(&conn, subject_id, name)
    }

    fn remove(&self, subject_id: &str, name: &str) -> Result<bool> {
        let rows_affected = self
            .lock()?
            .execute(
                "DELETE FROM secrets WHERE subject_id = ?1 AND name = ?2",
                params![subject_id, name],
            )
            .context("Failed to delete secret")?;
        Ok(rows_affected > 0)
    }

    fn list_names(&self, subject_id: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name FROM secrets WHERE subject_id = ?1 ORDER BY name")
            .context("Failed to prepare query")?;

        let names = stmt
            .query_map(params![subject_id], |row| row.get(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        Ok(names)
    }
}

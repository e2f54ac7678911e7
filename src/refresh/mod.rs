//! Calendar token lifecycle.
//!
//! A subject's tokens live in the secret store as three records: the access
//! token, the refresh token and the access token's expiry (epoch milliseconds
//! as decimal text). Per subject they move through:
//!
//! ```text
//!   Absent ──code exchange──▶ Valid ──now >= expires_at──▶ Expired
//!                               ▲                            │
//!                               └──────refresh ok────────────┤
//!                                                            ▼
//!                       no refresh token / refresh failed: Unrefreshable
//! ```
//!
//! `Unrefreshable` is terminal until the subject re-authorizes or disconnects.
//!
//! The coordinator does not serialize callers itself; [`crate::access::TokenAccess`]
//! runs [`RefreshCoordinator::resolve`] under a per-subject guard.

use crate::access::TokenLookup;
use crate::credentials::SecretStore;
use crate::error::VaultError;
use crate::oauth::{TokenClient, TokenGrant};
use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Record name of the access token
pub const ACCESS_TOKEN: &str = "calendar_access_token";
/// Record name of the refresh token
pub const REFRESH_TOKEN: &str = "calendar_refresh_token";
/// Record name of the access token expiry
pub const TOKEN_EXPIRY: &str = "calendar_token_expiry";

/// Decrypted view over a subject's three token records.
#[derive(Clone, PartialEq)]
pub struct ProviderTokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// `None` only when the expiry record is missing or unreadable
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for ProviderTokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderTokenSet")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Where a subject currently sits in the token lifecycle.
#[derive(Clone, PartialEq)]
pub enum TokenState {
    /// No access token on record
    Absent,
    /// Access token usable until its expiry
    Valid(String),
    /// Access token expired, refresh token available
    Expired { refresh_token: String },
    /// Caller must re-authorize
    Unrefreshable,
}

impl std::fmt::Debug for TokenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenState::Absent => f.write_str("Absent"),
            TokenState::Valid(_) => f.write_str("Valid"),
            TokenState::Expired { .. } => f.write_str("Expired"),
            TokenState::Unrefreshable => f.write_str("Unrefreshable"),
        }
    }
}

/// `expires_at` is the provider-reported absolute expiry. A token is expired
/// from that instant on; `buffer` moves the cut-off earlier.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>, buffer: Duration) -> bool {
    now + buffer >= expires_at
}

fn encode_expiry(expires_at: DateTime<Utc>) -> String {
    expires_at.timestamp_millis().to_string()
}

fn decode_expiry(value: &str) -> Option<DateTime<Utc>> {
    let millis = value.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Checks expiry, calls the token endpoint, and persists refreshed tokens.
pub struct RefreshCoordinator {
    store: Arc<SecretStore>,
    client: TokenClient,
    refresh_buffer: Duration,
    unrefreshable: DashSet<String>,
}

impl RefreshCoordinator {
    /// # Arguments
    /// * `store` - secret store holding the token records
    /// * `client` - token endpoint client
    /// * `refresh_buffer` - treat tokens as expired this long before
    ///   `expires_at` (zero refreshes exactly at the provider's expiry)
    pub fn new(store: Arc<SecretStore>, client: TokenClient, refresh_buffer: Duration) -> Self {
        Self {
            store,
            client,
            refresh_buffer,
            unrefreshable: DashSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<SecretStore> {
        &self.store
    }

    pub fn client(&self) -> &TokenClient {
        &self.client
    }

    /// Reads and decrypts the subject's token records.
    pub fn load_token_set(&self, subject_id: &str) -> Option<ProviderTokenSet> {
        let access_token = self.store.get_string(subject_id, ACCESS_TOKEN)?;
        let refresh_token = self.store.get_string(subject_id, REFRESH_TOKEN);
        let expires_at = match self.store.get_string(subject_id, TOKEN_EXPIRY) {
            Some(raw) => {
                let parsed = decode_expiry(&raw);
                if parsed.is_none() {
                    warn!(subject = %subject_id, "Stored token expiry is not a valid timestamp");
                }
                parsed
            }
            None => None,
        };

        Some(ProviderTokenSet {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Classifies the subject's tokens at `now`.
    pub fn state(&self, subject_id: &str, now: DateTime<Utc>) -> TokenState {
        let Some(tokens) = self.load_token_set(subject_id) else {
            return TokenState::Absent;
        };

        if self.unrefreshable.contains(subject_id) {
            return TokenState::Unrefreshable;
        }

        let expired = match tokens.expires_at {
            Some(expires_at) => is_expired(expires_at, now, self.refresh_buffer),
            None => {
                warn!(subject = %subject_id, "Access token has no expiry on record, treating as expired");
                true
            }
        };

        if !expired {
            return TokenState::Valid(tokens.access_token);
        }

        match tokens.refresh_token {
            Some(refresh_token) => TokenState::Expired { refresh_token },
            None => {
                info!(subject = %subject_id, "Access token expired and no refresh token on record");
                TokenState::Unrefreshable
            }
        }
    }

    /// Whether the subject was marked unrefreshable by a failed refresh.
    pub fn is_marked_unrefreshable(&self, subject_id: &str) -> bool {
        self.unrefreshable.contains(subject_id)
    }

    /// Check expiry, refresh once if needed, and report the outcome.
    ///
    /// Makes at most one call to the token endpoint. A rejected or failed
    /// token endpoint call marks the subject unrefreshable so later calls
    /// answer without HTTP. A storage failure does not.
    pub async fn resolve(&self, subject_id: &str, now: DateTime<Utc>) -> TokenLookup {
        match self.state(subject_id, now) {
            TokenState::Absent => TokenLookup::NotConnected,
            TokenState::Valid(access_token) => TokenLookup::Available(access_token),
            TokenState::Unrefreshable => TokenLookup::ReconnectRequired,
            TokenState::Expired { refresh_token } => {
                match self.refresh(subject_id, &refresh_token).await {
                    Ok(access_token) => TokenLookup::Available(access_token),
                    Err(e @ VaultError::RefreshFailure(_)) => {
                        warn!(subject = %subject_id, error = %e, "Token refresh failed, reconnect required");
                        self.unrefreshable.insert(subject_id.to_string());
                        TokenLookup::ReconnectRequired
                    }
                    Err(e) => {
                        // Not marked: the next lookup retries once storage recovers
                        error!(subject = %subject_id, error = %e, "Refreshed token could not be stored");
                        TokenLookup::ReconnectRequired
                    }
                }
            }
        }
    }

    /// Refreshes the access token and persists the result.
    ///
    /// Returns the new access token only after it has been stored. If the
    /// provider did not rotate the refresh token, the existing one is kept.
    pub async fn refresh(&self, subject_id: &str, refresh_token: &str) -> Result<String, VaultError> {
        info!(subject = %subject_id, "Refreshing calendar access token");

        let grant = self.client.refresh(refresh_token).await?;
        self.persist(subject_id, &grant)?;

        info!(
            subject = %subject_id,
            rotated_refresh_token = grant.refresh_token.is_some(),
            "Calendar access token refreshed"
        );
        Ok(grant.access_token)
    }

    /// Exchanges an authorization code and stores the resulting tokens.
    pub async fn complete_authorization(
        &self,
        subject_id: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(), VaultError> {
        let grant = self.client.exchange_code(code, redirect_uri).await?;
        self.persist(subject_id, &grant)?;

        if grant.refresh_token.is_none() && self.store.get(subject_id, REFRESH_TOKEN).is_none() {
            warn!(subject = %subject_id, "Provider issued no refresh token; access will end at expiry");
        }

        info!(
            subject = %subject_id,
            has_refresh_token = grant.refresh_token.is_some(),
            "Calendar authorization completed"
        );
        Ok(())
    }

    /// Writes a grant to the store.
    ///
    /// Order: refresh token (only if issued), access token, expiry. A failure
    /// part-way leaves the new access token with the old, already-passed
    /// expiry, which reads as expired and triggers another refresh.
    pub fn persist(&self, subject_id: &str, grant: &TokenGrant) -> Result<(), VaultError> {
        if let Some(refresh_token) = &grant.refresh_token {
            self.store.store(subject_id, REFRESH_TOKEN, refresh_token)?;
        }
        self.store.store(subject_id, ACCESS_TOKEN, &grant.access_token)?;
        self.store
            .store(subject_id, TOKEN_EXPIRY, encode_expiry(grant.expires_at))?;

        self.unrefreshable.remove(subject_id);
        debug!(subject = %subject_id, expires_at = %grant.expires_at, "Token set persisted");
        Ok(())
    }

    /// Revokes all of the subject's token records.
    pub fn forget(&self, subject_id: &str) -> Result<(), VaultError> {
        self.store.revoke(subject_id, ACCESS_TOKEN)?;
        self.store.revoke(subject_id, TOKEN_EXPIRY)?;
        self.store.revoke(subject_id, REFRESH_TOKEN)?;
        self.unrefreshable.remove(subject_id);
        info!(subject = %subject_id, "Calendar tokens revoked");
        Ok(())
    }
}

//! Single entry point for obtaining a usable calendar access token.
//!
//! Callers never see the expiry check or the refresh. Every operation for a
//! subject runs under that subject's guard, so concurrent callers hitting the
//! same expired token queue behind one refresh and then read its result.
//!
//! The guarded section runs in a spawned task. A caller that stops waiting
//! does not cancel a refresh that other callers are queued behind.

use crate::error::VaultError;
use crate::refresh::RefreshCoordinator;
use chrono::Utc;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Outcome of an access token lookup.
#[derive(Clone, PartialEq)]
pub enum TokenLookup {
    /// Currently valid access token
    Available(String),
    /// No tokens were ever stored for the subject
    NotConnected,
    /// Tokens exist but cannot be refreshed; the subject must re-authorize
    ReconnectRequired,
}

impl TokenLookup {
    pub fn into_token(self) -> Option<String> {
        match self {
            TokenLookup::Available(token) => Some(token),
            _ => None,
        }
    }

    pub fn is_reconnect_required(&self) -> bool {
        matches!(self, TokenLookup::ReconnectRequired)
    }
}

impl std::fmt::Debug for TokenLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenLookup::Available(_) => f.write_str("Available(<token>)"),
            TokenLookup::NotConnected => f.write_str("NotConnected"),
            TokenLookup::ReconnectRequired => f.write_str("ReconnectRequired"),
        }
    }
}

/// Token access façade.
pub struct TokenAccess {
    coordinator: Arc<RefreshCoordinator>,
    /// Entries exist only while some operation for the subject is queued or running
    guards: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl TokenAccess {
    pub fn new(coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            coordinator,
            guards: Arc::new(DashMap::new()),
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Returns a valid access token, or `None` if there is none and the
    /// subject has to (re)connect.
    pub async fn get_valid_access_token(&self, subject_id: &str) -> Option<String> {
        self.lookup(subject_id).await.into_token()
    }

    /// Like [`get_valid_access_token`](Self::get_valid_access_token) but tells
    /// "never connected" apart from "reconnect required".
    pub async fn lookup(&self, subject_id: &str) -> TokenLookup {
        let coordinator = Arc::clone(&self.coordinator);
        let subject = subject_id.to_string();

        let outcome = self
            .run_guarded(subject_id, async move {
                coordinator.resolve(&subject, Utc::now()).await
            })
            .await;

        match outcome {
            Ok(lookup) => {
                debug!(subject = %subject_id, outcome = ?lookup, "Access token lookup");
                lookup
            }
            Err(e) => {
                error!(subject = %subject_id, error = %e, "Access token lookup aborted");
                TokenLookup::ReconnectRequired
            }
        }
    }

    /// Completes an authorization code exchange for the subject.
    pub async fn connect(&self, subject_id: &str, code: &str, redirect_uri: &str) -> Result<(), VaultError> {
        let coordinator = Arc::clone(&self.coordinator);
        let subject = subject_id.to_string();
        let code = code.to_string();
        let redirect_uri = redirect_uri.to_string();

        self.run_guarded(subject_id, async move {
            coordinator
                .complete_authorization(&subject, &code, &redirect_uri)
                .await
        })
        .await?
    }

    /// Removes all of the subject's tokens. Idempotent.
    pub async fn disconnect(&self, subject_id: &str) -> Result<(), VaultError> {
        let coordinator = Arc::clone(&self.coordinator);
        let subject = subject_id.to_string();

        self.run_guarded(subject_id, async move { coordinator.forget(&subject) })
            .await?
    }

    fn guard_for(&self, subject_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.guards.entry(subject_id.to_string()).or_default().value())
    }

    /// Runs `work` in a detached task while holding the subject's guard.
    ///
    /// The last task to release a guard removes it from the map.
    async fn run_guarded<F, T>(&self, subject_id: &str, work: F) -> Result<T, VaultError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.guard_for(subject_id);
        let guards = Arc::clone(&self.guards);
        let subject = subject_id.to_string();

        let task = tokio::spawn(async move {
            let held = guard.lock_owned().await;
            let output = work.await;
            drop(held);
            guards.remove_if(subject.as_str(), |_, g| Arc::strong_count(g) == 1);
            output
        });

        task.await
            .map_err(|e| VaultError::Storage(format!("token task failed: {}", e)))
    }
}

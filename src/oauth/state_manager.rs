//! CSRF `state` parameters for the authorization redirect.
//!
//! Each state is single-use and binds the provider callback back to the
//! subject that started the flow.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Authorization started by a subject and not yet completed
#[derive(Clone, Debug)]
pub struct PendingAuthorization {
    pub subject_id: String,
    pub issued_at: DateTime<Utc>,
}

/// Issued, unconsumed state tokens with expiry
#[derive(Clone)]
pub struct AuthorizationStates {
    pending: Arc<DashMap<String, PendingAuthorization>>,
    ttl: Duration,
}

impl AuthorizationStates {
    /// # Arguments
    /// * `ttl_seconds` - how long an issued state stays valid
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Issues a fresh state token (UUID v4) for `subject_id`.
    pub fn issue(&self, subject_id: &str) -> String {
        let state = Uuid::new_v4().to_string();
        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                subject_id: subject_id.to_string(),
                issued_at: Utc::now(),
            },
        );
        state
    }

    /// Removes the state and returns its authorization if it has not expired.
    pub fn consume(&self, state: &str) -> Option<PendingAuthorization> {
        let (_, pending) = self.pending.remove(state)?;
        if Utc::now() - pending.issued_at > self.ttl {
            return None;
        }
        Some(pending)
    }

    /// Drops every expired state.
    pub fn purge_expired(&self) {
        let cutoff = Utc::now() - self.ttl;
        self.pending.retain(|_, pending| pending.issued_at >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Background task to periodically purge expired states
pub async fn run_state_cleanup(states: AuthorizationStates, interval_seconds: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));

    loop {
        interval.tick().await;
        states.purge_expired();
        tracing::debug!(remaining = states.len(), "OAuth state cleanup complete");
    }
}

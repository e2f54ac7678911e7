//! Token endpoint client.
//!
//! Handles the `authorization_code` and `refresh_token` grants. Neither call
//! retries; retry policy belongs to the caller.

use super::provider::ProviderConfig;
use crate::error::VaultError;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

/// Upper bound on a provider-reported `expires_in`
const MAX_LIFETIME_SECONDS: i64 = 366 * 24 * 3600;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// Tokens issued by one successful grant.
#[derive(Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present only when the provider issued (or rotated) a refresh token
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// HTTP client for the provider's token endpoint.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    provider: ProviderConfig,
    default_expires_in: Duration,
}

impl TokenClient {
    /// # Arguments
    /// * `provider` - endpoints and client credentials
    /// * `timeout` - per-request timeout applied to every grant
    /// * `default_expires_in` - lifetime assumed when `expires_in` is omitted
    pub fn new(
        provider: ProviderConfig,
        timeout: std::time::Duration,
        default_expires_in: Duration,
    ) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            provider,
            default_expires_in,
        })
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant, VaultError> {
        debug!(token_url = %self.provider.token_url, "Exchanging authorization code for token");

        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
        ])
        .await
    }

    /// Obtain a new access token with a refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, VaultError> {
        debug!(token_url = %self.provider.token_url, "Refreshing access token");

        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.provider.client_id.as_str()),
            ("client_secret", self.provider.client_secret.as_str()),
        ])
        .await
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, VaultError> {
        let response = self
            .http
            .post(&self.provider.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| VaultError::RefreshFailure(format!("Failed to reach token endpoint: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(VaultError::RefreshFailure(format!(
                "Token endpoint returned status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| VaultError::RefreshFailure(format!("Failed to parse token response: {}", e)))?;

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token endpoint call successful"
        );

        self.grant_from(token_response, Utc::now())
    }

    fn grant_from(&self, response: TokenResponse, now: DateTime<Utc>) -> Result<TokenGrant, VaultError> {
        if response.access_token.is_empty() {
            return Err(VaultError::RefreshFailure(
                "Token response has an empty access_token".to_string(),
            ));
        }

        let lifetime = response
            .expires_in
            .map(|secs| Duration::seconds(secs.clamp(0, MAX_LIFETIME_SECONDS)))
            .unwrap_or(self.default_expires_in);

        Ok(TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expires_at: now + lifetime,
        })
    }
}

//! Authorization code flow endpoints.

use super::{ApiError, AppState};
use crate::auth::extract_subject;
use crate::error::VaultError;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Json, Redirect},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth success response
#[derive(Serialize)]
pub struct ConnectResponse {
    success: bool,
    message: String,
}

/// GET /api/calendar/oauth/start
///
/// Issues a single-use CSRF state bound to the subject and redirects to the
/// provider's consent page.
pub(super) async fn oauth_start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Redirect, ApiError> {
    let subject = extract_subject(&headers).map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let csrf_state = state.states.issue(&subject);
    let auth_url = state.provider.build_auth_url(&csrf_state, &state.redirect_uri());

    info!(subject = %subject, "Redirecting to calendar provider for authorization");
    Ok(Redirect::temporary(&auth_url))
}

/// GET /api/calendar/oauth/callback
///
/// The subject is recovered from the consumed state, not from request headers:
/// the provider's redirect carries no identity of its own.
pub(super) async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Json<ConnectResponse>, ApiError> {
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "Calendar authorization denied");
        return Err(ApiError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| ApiError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| ApiError::BadRequest("Missing 'state' parameter".to_string()))?;

    let pending = state.states.consume(&csrf_state).ok_or_else(|| {
        warn!("Invalid or expired OAuth state");
        ApiError::Unauthorized("Invalid or expired OAuth state".to_string())
    })?;
    let subject = pending.subject_id;

    debug!(subject = %subject, "OAuth state validated, exchanging code");

    state
        .access
        .connect(&subject, &code, &state.redirect_uri())
        .await
        .map_err(|e| {
            error!(subject = %subject, error = %e, "Calendar authorization failed");
            match e {
                VaultError::RefreshFailure(msg) => {
                    ApiError::BadGateway(format!("Failed to exchange authorization code: {}", msg))
                }
                other => ApiError::ServerError(other.to_string()),
            }
        })?;

    Ok(Json(ConnectResponse {
        success: true,
        message: "Calendar connected".to_string(),
    }))
}

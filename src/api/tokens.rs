//! Token lookup and connection management endpoints.

use super::{ApiError, AppState};
use crate::access::TokenLookup;
use crate::auth::extract_subject;
use crate::credentials::SecretMetadata;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Response for GET /api/calendar/token
#[derive(Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Response for GET /api/calendar/connection
#[derive(Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub records: Vec<SecretMetadata>,
}

/// GET /api/calendar/token
///
/// 404 `not_connected` when the subject never connected, 401
/// `reconnect_required` when the token expired and could not be refreshed.
pub(super) async fn get_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let subject = extract_subject(&headers).map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    match state.access.lookup(&subject).await {
        TokenLookup::Available(access_token) => Ok(Json(AccessTokenResponse {
            access_token,
            token_type: "Bearer",
        })),
        TokenLookup::NotConnected => Err(ApiError::NotConnected),
        TokenLookup::ReconnectRequired => Err(ApiError::ReconnectRequired),
    }
}

/// GET /api/calendar/connection
///
/// Timestamps of the subject's token records. Never returns token material.
pub(super) async fn connection_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ConnectionStatus>, ApiError> {
    let subject = extract_subject(&headers).map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let store = state.access.coordinator().store();
    let names = store.list_names(&subject).map_err(|e| {
        error!(subject = %subject, error = %e, "Failed to list token records");
        ApiError::ServerError(e.to_string())
    })?;

    let records: Vec<SecretMetadata> = names
        .iter()
        .filter_map(|name| store.metadata(&subject, name))
        .collect();

    Ok(Json(ConnectionStatus {
        connected: !records.is_empty(),
        records,
    }))
}

/// DELETE /api/calendar/connection
///
/// Idempotent: disconnecting an unconnected subject also returns 204.
pub(super) async fn disconnect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let subject = extract_subject(&headers).map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    state.access.disconnect(&subject).await.map_err(|e| {
        error!(subject = %subject, error = %e, "Failed to revoke calendar tokens");
        ApiError::ServerError(e.to_string())
    })?;

    info!(subject = %subject, "Calendar disconnected");
    Ok(StatusCode::NO_CONTENT)
}

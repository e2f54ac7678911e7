//! HTTP surface over the token access façade.
//!
//! Routes:
//! - `GET    /health`
//! - `GET    /api/calendar/oauth/start`      → redirect to the provider
//! - `GET    /api/calendar/oauth/callback`   → code exchange, tokens stored
//! - `GET    /api/calendar/token`            → valid access token
//! - `GET    /api/calendar/connection`       → record timestamps
//! - `DELETE /api/calendar/connection`       → revoke all tokens
//!
//! The subject is taken from the identity header set upstream (see
//! [`crate::auth`]).

mod authorize;
mod tokens;

use crate::access::TokenAccess;
use crate::oauth::{AuthorizationStates, ProviderConfig};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Path callers are sent to when they must (re)connect
pub const AUTHORIZE_PATH: &str = "/api/calendar/oauth/start";

/// Path the provider redirects back to
pub const CALLBACK_PATH: &str = "/api/calendar/oauth/callback";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub access: Arc<TokenAccess>,
    pub states: AuthorizationStates,
    pub provider: ProviderConfig,
    /// Public base URL of this service, used to build the redirect URI
    pub callback_base_url: String,
}

impl AppState {
    /// Redirect URI registered with the provider. Must be identical for the
    /// authorization request and the code exchange.
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.callback_base_url.trim_end_matches('/'), CALLBACK_PATH)
    }
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorize_url: Option<&'static str>,
}

/// Application error types
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotConnected,
    ReconnectRequired,
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, authorize_url) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::NotConnected => (
                StatusCode::NOT_FOUND,
                "not_connected",
                "No calendar connection for this subject".to_string(),
                Some(AUTHORIZE_PATH),
            ),
            ApiError::ReconnectRequired => (
                StatusCode::UNAUTHORIZED,
                "reconnect_required",
                "Calendar access expired and could not be renewed".to_string(),
                Some(AUTHORIZE_PATH),
            ),
            ApiError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "server_error", msg, None),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "bad_gateway", msg, None),
        };

        let body = Json(ErrorResponse {
            error,
            message,
            authorize_url,
        });

        (status, body).into_response()
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(AUTHORIZE_PATH, get(authorize::oauth_start))
        .route(CALLBACK_PATH, get(authorize::oauth_callback))
        .route("/api/calendar/token", get(tokens::get_token))
        .route(
            "/api/calendar/connection",
            get(tokens::connection_status).delete(tokens::disconnect),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health() -> &'static str {
    "ok"
}

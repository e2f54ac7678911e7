//! OAuth 2.0 plumbing for the calendar provider.
//!
//! Implements the authorization code flow plus refresh:
//! 1. Subject asks to connect → redirect to `ProviderConfig::build_auth_url`
//! 2. Provider redirects back with `code` and `state`
//! 3. `state` is consumed, `code` exchanged via `TokenClient::exchange_code`
//! 4. Later, expired access tokens are renewed via `TokenClient::refresh`

mod exchange;
mod provider;
mod state_manager;

pub use exchange::{TokenClient, TokenGrant};
pub use provider::ProviderConfig;
pub use state_manager::{run_state_cleanup, AuthorizationStates, PendingAuthorization};

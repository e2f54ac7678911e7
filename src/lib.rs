// Encrypted secret storage
pub mod credentials;

// OAuth provider endpoints, code exchange and CSRF state
pub mod oauth;

// Token expiry and refresh
pub mod refresh;

// Per-subject serialized token access
pub mod access;

// HTTP API
pub mod api;

// Caller identity
pub mod auth;

// Configuration and startup wiring
pub mod bootstrap;
pub mod config;

pub mod error;

pub use error::VaultError;

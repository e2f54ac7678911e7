use crate::credentials::kdf::{KdfParams, DEFAULT_SALT};
use crate::error::VaultError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "CREDVAULT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "credvault.toml";

/// Upper bound for every duration setting given in seconds (366 days)
pub const MAX_DURATION_SECONDS: i64 = 366 * 24 * 3600;

/// Complete credvault configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub vault: StoreConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Which backend holds the sealed records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Sqlite,
}

/// Secret store configuration
#[derive(Clone, Deserialize)]
pub struct StoreConfig {
    /// Long-term secret the encryption key is derived from
    #[serde(default)]
    pub master_secret: String,
    /// Generate an ephemeral master secret when none is configured.
    /// Records written under it are unreadable after restart.
    #[serde(default)]
    pub allow_dev_secret: bool,
    #[serde(default = "default_kdf_salt")]
    pub kdf_salt: String,
    #[serde(default)]
    pub kdf: KdfParams,
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_kdf_salt() -> String {
    DEFAULT_SALT.to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::Memory
}

fn default_db_path() -> String {
    "credvault.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            master_secret: String::new(),
            allow_dev_secret: false,
            kdf_salt: default_kdf_salt(),
            kdf: KdfParams::default(),
            backend: default_backend(),
            db_path: default_db_path(),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("master_secret", &redact(&self.master_secret))
            .field("allow_dev_secret", &self.allow_dev_secret)
            .field("kdf_salt", &self.kdf_salt)
            .field("kdf", &self.kdf)
            .field("backend", &self.backend)
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// OAuth provider configuration (single calendar-style provider)
#[derive(Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Treat tokens as expired this many seconds before the provider says so
    #[serde(default)]
    pub refresh_buffer_seconds: i64,
    /// Lifetime assumed when a token response omits `expires_in`
    #[serde(default = "default_expires_in")]
    pub default_expires_in_seconds: i64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// How long an issued CSRF state stays valid
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/calendar.readonly".to_string()]
}

fn default_expires_in() -> i64 {
    3600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_state_expiry() -> i64 {
    600
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            scopes: default_scopes(),
            refresh_buffer_seconds: 0,
            default_expires_in_seconds: default_expires_in(),
            request_timeout_seconds: default_request_timeout(),
            state_expiry_seconds: default_state_expiry(),
        }
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("refresh_buffer_seconds", &self.refresh_buffer_seconds)
            .field("default_expires_in_seconds", &self.default_expires_in_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("state_expiry_seconds", &self.state_expiry_seconds)
            .finish()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL the provider redirects back to
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_callback_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_state_cleanup_interval() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            callback_base_url: default_callback_base_url(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
        }
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl VaultConfig {
    /// Loads the TOML file named by `CREDVAULT_CONFIG` (defaults apply when it
    /// does not exist), then applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            info!(path = %path, "Loading configuration file");
            load_config(&path)?
        } else {
            info!(path = %path, "Configuration file not found, using defaults");
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Overrides fields from environment variables.
    ///
    /// Values that fail to parse are ignored and the existing value kept.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CREDVAULT_MASTER_SECRET") {
            self.vault.master_secret = v;
        }
        if let Some(v) = lookup("CREDVAULT_ALLOW_DEV_SECRET") {
            if let Ok(b) = v.parse::<bool>() {
                self.vault.allow_dev_secret = b;
            }
        }
        if let Some(v) = lookup("CREDVAULT_DB_PATH") {
            self.vault.db_path = v;
            self.vault.backend = BackendKind::Sqlite;
        }
        if let Some(v) = lookup("CREDVAULT_OAUTH_CLIENT_ID") {
            self.oauth.client_id = v;
        }
        if let Some(v) = lookup("CREDVAULT_OAUTH_CLIENT_SECRET") {
            self.oauth.client_secret = v;
        }
        if let Some(v) = lookup("CREDVAULT_OAUTH_TOKEN_URL") {
            self.oauth.token_url = v;
        }
        if let Some(v) = lookup("CREDVAULT_OAUTH_AUTH_URL") {
            self.oauth.auth_url = v;
        }
        if let Some(v) = lookup("CREDVAULT_REFRESH_BUFFER_SECONDS") {
            if let Ok(n) = v.parse::<i64>() {
                self.oauth.refresh_buffer_seconds = n;
            }
        }
        if let Some(v) = lookup("CREDVAULT_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("CREDVAULT_CALLBACK_BASE_URL") {
            self.server.callback_base_url = v;
        }
    }

    /// Checks the settings that must be present before serving requests.
    ///
    /// The master secret is checked separately when the key is derived.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(VaultError::Configuration(
                "OAuth client id is not set (CREDVAULT_OAUTH_CLIENT_ID)".to_string(),
            ));
        }
        if self.oauth.client_secret.trim().is_empty() {
            return Err(VaultError::Configuration(
                "OAuth client secret is not set (CREDVAULT_OAUTH_CLIENT_SECRET)".to_string(),
            ));
        }
        if self.oauth.token_url.trim().is_empty() {
            return Err(VaultError::Configuration("OAuth token URL is empty".to_string()));
        }
        check_seconds("refresh_buffer_seconds", self.oauth.refresh_buffer_seconds, 0)?;
        check_seconds("default_expires_in_seconds", self.oauth.default_expires_in_seconds, 1)?;
        check_seconds("state_expiry_seconds", self.oauth.state_expiry_seconds, 1)?;
        if self.oauth.request_timeout_seconds == 0 {
            return Err(VaultError::Configuration(
                "request_timeout_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_seconds(field: &str, value: i64, min: i64) -> Result<(), VaultError> {
    if value < min || value > MAX_DURATION_SECONDS {
        return Err(VaultError::Configuration(format!(
            "{} must be between {} and {}, got {}",
            field, min, MAX_DURATION_SECONDS, value
        )));
    }
    Ok(())
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VaultConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: VaultConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

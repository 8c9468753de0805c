use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Complete jobscout configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// OAuth client configuration.
///
/// Client credentials are optional: without them the OAuth feature reports
/// itself disabled and the rest of the service keeps working.
#[derive(Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_authorization_url")]
    pub authorization_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
    /// How long a state token stays redeemable (seconds)
    #[serde(default = "default_pending_auth_ttl")]
    pub pending_auth_ttl_seconds: i64,
    /// How often expired state tokens are swept (seconds)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Deadline for each identity provider call (seconds)
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_seconds: u64,
    /// Lifetime of the API session token issued on callback (seconds)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: i64,
}

/// Upper bound for `pending_auth_ttl_seconds` (one day)
pub const MAX_PENDING_AUTH_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Upper bound for `session_ttl_seconds` (30 days)
pub const MAX_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

fn default_redirect_uri() -> String {
    "http://localhost:8000/api/auth/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string(), "email".to_string()]
}

fn default_authorization_url() -> String {
    "https://www.linkedin.com/oauth/v2/authorization".to_string()
}

fn default_token_url() -> String {
    "https://www.linkedin.com/oauth/v2/accessToken".to_string()
}

fn default_userinfo_url() -> String {
    "https://api.linkedin.com/v2/userinfo".to_string()
}

fn default_pending_auth_ttl() -> i64 {
    600
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_upstream_timeout() -> u64 {
    15
}

fn default_session_ttl() -> i64 {
    24 * 60 * 60
}

fn bounded_ttl(name: &str, seconds: i64, max: i64) -> Result<chrono::Duration> {
    if !(1..=max).contains(&seconds) {
        bail!("{} must be between 1 and {} seconds, got {}", name, max, seconds);
    }
    chrono::Duration::try_seconds(seconds)
        .with_context(|| format!("{} is out of range", name))
}

impl OAuthConfig {
    /// True when both client id and secret are present and non-blank.
    pub fn has_client_credentials(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        present(&self.client_id) && present(&self.client_secret)
    }

    /// Validated state-token lifetime.
    pub fn pending_auth_ttl(&self) -> Result<chrono::Duration> {
        bounded_ttl(
            "oauth.pending_auth_ttl_seconds",
            self.pending_auth_ttl_seconds,
            MAX_PENDING_AUTH_TTL_SECONDS,
        )
    }

    /// Validated session-token lifetime.
    pub fn session_ttl(&self) -> Result<chrono::Duration> {
        bounded_ttl(
            "oauth.session_ttl_seconds",
            self.session_ttl_seconds,
            MAX_SESSION_TTL_SECONDS,
        )
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            authorization_url: default_authorization_url(),
            token_url: default_token_url(),
            userinfo_url: default_userinfo_url(),
            pending_auth_ttl_seconds: default_pending_auth_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
            upstream_timeout_seconds: default_upstream_timeout(),
            session_ttl_seconds: default_session_ttl(),
        }
    }
}

// Hand-written so the client secret never reaches the logs.
impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("authorization_url", &self.authorization_url)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("pending_auth_ttl_seconds", &self.pending_auth_ttl_seconds)
            .field("cleanup_interval_seconds", &self.cleanup_interval_seconds)
            .field("upstream_timeout_seconds", &self.upstream_timeout_seconds)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .finish()
    }
}

/// Token encryption configuration
#[derive(Clone, Default, Deserialize)]
pub struct CryptoConfig {
    /// Base64-encoded 32-byte key. Prefer `JOBSCOUT_SECRET_KEY` over the file.
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Upper bound on candidates per search
pub const MAX_RESULTS_LIMIT: usize = 100;

/// Search pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Default number of candidates pulled per search (1..=100)
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Deadline for pulling candidates from the source (seconds)
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
    /// Skip candidates already recorded in the ledger
    #[serde(default = "default_filter_duplicates")]
    pub filter_duplicates: bool,
    /// SQLite ledger file; in-memory ledger when unset
    #[serde(default)]
    pub ledger_path: Option<String>,
    /// JSON file of candidate records served by the file-backed source
    #[serde(default)]
    pub candidates_path: Option<String>,
    /// How long finished background searches stay queryable (seconds)
    #[serde(default = "default_task_retention")]
    pub task_retention_seconds: u64,
    /// Most background searches tracked at once
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

fn default_task_retention() -> u64 {
    3600
}

fn default_max_tasks() -> usize {
    1000
}

fn default_max_results() -> usize {
    25
}

fn default_search_timeout() -> u64 {
    30
}

fn default_filter_duplicates() -> bool {
    true
}

impl SearchConfig {
    /// Clamps a requested result count into `1..=MAX_RESULTS_LIMIT`, using the default when absent.
    pub fn effective_max_results(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.max_results)
            .clamp(1, MAX_RESULTS_LIMIT)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            timeout_seconds: default_search_timeout(),
            filter_duplicates: default_filter_duplicates(),
            ledger_path: None,
            candidates_path: None,
            task_retention_seconds: default_task_retention(),
            max_tasks: default_max_tasks(),
        }
    }
}

impl AppConfig {
    /// Rejects values that would make the service misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        self.oauth.pending_auth_ttl()?;
        self.oauth.session_ttl()?;
        if self.search.max_tasks == 0 {
            bail!("search.max_tasks must be at least 1");
        }
        Ok(())
    }

    /// Applies `JOBSCOUT_*` environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`AppConfig::apply_env`] with an injectable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("JOBSCOUT_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("JOBSCOUT_OAUTH_CLIENT_ID") {
            self.oauth.client_id = Some(v);
        }
        if let Some(v) = lookup("JOBSCOUT_OAUTH_CLIENT_SECRET") {
            self.oauth.client_secret = Some(v);
        }
        if let Some(v) = lookup("JOBSCOUT_OAUTH_REDIRECT_URI") {
            self.oauth.redirect_uri = v;
        }
        if let Some(v) = lookup("JOBSCOUT_OAUTH_SCOPES") {
            self.oauth.scopes = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("JOBSCOUT_PENDING_AUTH_TTL_SECONDS") {
            if let Ok(n) = v.parse::<i64>() {
                self.oauth.pending_auth_ttl_seconds = n;
            }
        }
        if let Some(v) = lookup("JOBSCOUT_UPSTREAM_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.oauth.upstream_timeout_seconds = n;
            }
        }
        if let Some(v) = lookup("JOBSCOUT_SESSION_TTL_SECONDS") {
            if let Ok(n) = v.parse::<i64>() {
                self.oauth.session_ttl_seconds = n;
            }
        }
        if let Some(v) = lookup("JOBSCOUT_SECRET_KEY") {
            self.crypto.secret_key = Some(v);
        }
        if let Some(v) = lookup("JOBSCOUT_SEARCH_MAX_RESULTS") {
            if let Ok(n) = v.parse::<usize>() {
                self.search.max_results = n;
            }
        }
        if let Some(v) = lookup("JOBSCOUT_SEARCH_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.search.timeout_seconds = n;
            }
        }
        if let Some(v) = lookup("JOBSCOUT_LEDGER_PATH") {
            self.search.ledger_path = Some(v);
        }
        if let Some(v) = lookup("JOBSCOUT_CANDIDATES_PATH") {
            self.search.candidates_path = Some(v);
        }
    }
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Loads `path` if it exists, defaults otherwise, then applies env overrides.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        AppConfig::default()
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

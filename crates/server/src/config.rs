use serde::Deserialize;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Which flavour of error rendering and diagnostics the service uses.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Local,
    Testing,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Credentials of the first-party client the login endpoints exchange passwords through.
#[derive(Clone, Debug, Deserialize)]
pub struct PasswordClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenConfig {
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: default_access_token_lifetime(),
            refresh_token_lifetime: default_refresh_token_lifetime(),
        }
    }
}

fn default_access_token_lifetime() -> i64 {
    3600 // 1 hour
}

fn default_refresh_token_lifetime() -> i64 {
    86400 * 30 // 30 days
}

#[derive(Clone, Debug, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,
    #[serde(default)]
    pub exposed_headers: Vec<String>,
    #[serde(default)]
    pub supports_credentials: bool,
    #[serde(default)]
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_headers: vec!["*".to_string()],
            allowed_methods: default_allowed_methods(),
            exposed_headers: vec![],
            supports_credentials: false,
            max_age: 0,
        }
    }
}

fn default_allowed_methods() -> Vec<String> {
    vec!["*".to_string()]
}

/// Login throttling: `max_attempts` failures within `decay_seconds` locks the key out.
#[derive(Clone, Debug, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_decay_seconds")]
    pub decay_seconds: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            decay_seconds: default_decay_seconds(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_decay_seconds() -> u64 {
    60
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub environment: Environment,
    /// Public base URL, used to build verification and password reset links.
    pub app_url: String,
    /// Where session-mode callers are redirected after logging in.
    #[serde(default = "default_home_path")]
    pub home_path: String,
    /// HMAC secret for access tokens and signed URLs.
    pub token_secret: String,
    pub password_client: PasswordClientConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default = "default_locales")]
    pub locales: Vec<String>,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    /// Peers whose `X-Forwarded-For` header is believed. Empty means the
    /// socket peer address is always the client address.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,
    pub smtp: SmtpConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_home_path() -> String {
    "/home".to_string()
}

fn default_locales() -> Vec<String> {
    vec!["en".to_string(), "pt".to_string()]
}

impl AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.token_secret.len() < 32 {
            return Err(ConfigError::Validation(
                "token_secret must be at least 32 characters".into(),
            ));
        }
        if self.password_client.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "password_client.client_id must be set".into(),
            ));
        }
        if self.locales.is_empty() {
            return Err(ConfigError::Validation(
                "locales must contain at least one locale".into(),
            ));
        }
        if self.throttle.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "throttle.max_attempts must be > 0".into(),
            ));
        }
        if self.smtp.port == 0 {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching a key path separated by double underscores
/// (e.g. `PASSWORD_CLIENT__CLIENT_SECRET`) overrides the file value. A `.env` file in
/// the working directory is loaded first when present.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment as EnvSource, File};

    let _ = dotenvy::dotenv();

    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(EnvSource::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;

    Ok(app)
}

/// Convenience helper for binaries wanting the panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

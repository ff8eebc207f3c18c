use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "vitals.toml";

/// Complete vitals configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VitalsConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    /// Per-provider settings keyed by provider name (e.g. "strava")
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally reachable base URL used to build OAuth redirect URIs
    #[serde(default = "default_callback_base_url")]
    pub callback_base_url: String,
    /// When set, API routes require `Authorization: Bearer <api_token>`
    #[serde(default)]
    pub api_token: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

fn default_callback_base_url() -> String {
    "http://localhost:8501".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            callback_base_url: default_callback_base_url(),
            api_token: None,
        }
    }
}

/// Which token store backs the credential slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per slot
    #[default]
    Json,
    /// AES-256-GCM sealed rows in SQLite (needs VITALS_ENCRYPTION_KEY)
    Encrypted,
}

/// Credential storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory holding `<slot>.json` files (json backend)
    #[serde(default = "default_directory")]
    pub directory: String,
    /// SQLite database path (encrypted backend)
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_directory() -> String {
    ".".to_string()
}

fn default_database() -> String {
    "vitals.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            directory: default_directory(),
            database: default_database(),
        }
    }
}

/// Token lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Tokens this close to expiry are refreshed early (seconds)
    #[serde(default = "default_expiry_margin")]
    pub expiry_margin_seconds: i64,
    /// Request timeout for token endpoint calls (seconds)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// How long an OAuth CSRF state stays valid (seconds)
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
}

fn default_expiry_margin() -> i64 {
    60
}

fn default_http_timeout() -> u64 {
    30
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    300
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            expiry_margin_seconds: default_expiry_margin(),
            http_timeout_seconds: default_http_timeout(),
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
        }
    }
}

impl TokenConfig {
    /// Out-of-range values saturate to the largest representable margin.
    pub fn expiry_margin(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.expiry_margin_seconds.max(0))
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_seconds)
    }
}

/// Settings for one OAuth provider.
///
/// Built-in providers only need credentials; every endpoint field overrides
/// the built-in default. Unknown provider names must set `auth_url` and
/// `token_url`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSettings {
    /// Overridden by VITALS_OAUTH_<NAME>_CLIENT_ID
    #[serde(default)]
    pub client_id: Option<String>,
    /// Overridden by VITALS_OAUTH_<NAME>_CLIENT_SECRET
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Slot name; defaults to `<name>_tokens`
    #[serde(default)]
    pub slot: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default)]
    pub refresh_token_rotates: Option<bool>,
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VitalsConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: VitalsConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Loads the config named by VITALS_CONFIG, else `vitals.toml` if present,
/// else defaults.
pub fn load_from_env() -> Result<VitalsConfig> {
    if let Ok(path) = std::env::var("VITALS_CONFIG") {
        info!(path = %path, "Loading configuration");
        return load_config(path);
    }

    if Path::new(DEFAULT_CONFIG_FILE).exists() {
        info!(path = DEFAULT_CONFIG_FILE, "Loading configuration");
        return load_config(DEFAULT_CONFIG_FILE);
    }

    info!("No config file found, using defaults");
    Ok(VitalsConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VitalsConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:8501");
        assert_eq!(config.server.callback_base_url, "http://localhost:8501");
        assert!(config.server.api_token.is_none());
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.storage.directory, ".");
        assert_eq!(config.tokens.expiry_margin_seconds, 60);
        assert_eq!(config.tokens.http_timeout_seconds, 30);
        assert_eq!(config.tokens.state_expiry_seconds, 600);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:9000"
            callback_base_url = "https://health.example.com"
            api_token = "s3cret"

            [storage]
            backend = "encrypted"
            database = "/var/lib/vitals/tokens.db"

            [tokens]
            expiry_margin_seconds = 120
            http_timeout_seconds = 10

            [providers.strava]
            client_id = "168833"
            client_secret = "abc"

            [providers.google_fit]
            client_id = "id.apps.googleusercontent.com"
            client_secret = "def"
            slot = "google"
            scopes = ["https://www.googleapis.com/auth/fitness.activity.read"]
        "#;

        let config: VitalsConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.api_token.as_deref(), Some("s3cret"));
        assert_eq!(config.storage.backend, StorageBackend::Encrypted);
        assert_eq!(config.storage.database, "/var/lib/vitals/tokens.db");
        assert_eq!(config.tokens.expiry_margin(), chrono::Duration::seconds(120));
        assert_eq!(config.tokens.http_timeout(), std::time::Duration::from_secs(10));
        assert_eq!(config.providers.len(), 2);

        let fit = &config.providers["google_fit"];
        assert_eq!(fit.slot.as_deref(), Some("google"));
        assert_eq!(fit.scopes.as_ref().unwrap().len(), 1);
        assert!(fit.refresh_token_rotates.is_none());
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [tokens]
            expiry_margin_seconds = 0
        "#;

        let config: VitalsConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.tokens.expiry_margin_seconds, 0);
        assert_eq!(config.tokens.http_timeout_seconds, 30); // Default
        assert_eq!(config.storage.backend, StorageBackend::Json); // Default
    }

    #[test]
    fn test_negative_margin_clamped() {
        let tokens = TokenConfig {
            expiry_margin_seconds: -5,
            ..TokenConfig::default()
        };
        assert_eq!(tokens.expiry_margin(), chrono::Duration::zero());
    }

    #[test]
    fn test_huge_margin_saturates() {
        let config: VitalsConfig = toml::from_str(
            r#"
            [tokens]
            expiry_margin_seconds = 9223372036854775807
            "#,
        )
        .unwrap();
        assert_eq!(config.tokens.expiry_margin(), chrono::Duration::MAX);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vitals.toml");
        std::fs::write(&path, "[storage]\ndirectory = \"/tmp/tokens\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.storage.directory, "/tmp/tokens");

        assert!(load_config(dir.path().join("missing.toml")).is_err());
    }
}

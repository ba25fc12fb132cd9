use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Authorization rules.
///
/// The admin allow-list is the only source of the admin role: an identity is
/// admin iff its email exactly matches one of these entries. Role claims in
/// any client-visible payload are never trusted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Emails granted the admin role (case-sensitive exact match).
    #[serde(default)]
    pub admin_emails: Vec<String>,
    /// Which identity provider integration to run. "none" relies solely on
    /// the backend credential exchange.
    #[serde(default)]
    pub provider: ProviderMode,
    /// Fallback avatar asset served when the identity carries none.
    #[serde(default = "default_avatar")]
    pub default_avatar: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_emails: Vec::new(),
            provider: ProviderMode::default(),
            default_avatar: default_avatar(),
        }
    }
}

/// Identity provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// No external provider; sessions come from the backend exchange only
    /// and a cached session stands until a backend call rejects its token.
    #[default]
    None,
}

impl FromStr for ProviderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            other => Err(format!("Unknown provider mode: {other}")),
        }
    }
}

/// The application REST backend used for credential exchanges.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

/// Durable session persistence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub storage_backend: StorageBackend,
    /// Directory for the file backend.
    #[serde(default = "default_session_dir")]
    pub dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::default(),
            dir: default_session_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}
const fn default_port() -> u16 {
    4820
}
fn default_avatar() -> String {
    "/assets/avatar-default.png".to_string()
}
fn default_backend_url() -> String {
    "http://127.0.0.1:5000".to_string()
}
const fn default_backend_timeout() -> u64 {
    15
}
fn default_session_dir() -> PathBuf {
    PathBuf::from("portico-session")
}
fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply environment variable
    /// overrides. Any setting prefixed with `PORTICO_` takes precedence over
    /// the file value.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn apply_env_overrides(&mut self) {
        macro_rules! env_str {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                }
            };
        }
        macro_rules! env_bool {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                }
            };
        }
        macro_rules! env_parse {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                    }
                }
            };
        }
        macro_rules! env_list {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
            };
        }

        // -- Server --
        env_str!("PORTICO_SERVER_HOST", self.server.host);
        env_parse!("PORTICO_SERVER_PORT", self.server.port);
        env_list!("PORTICO_SERVER_CORS_ORIGINS", self.server.cors_origins);

        // -- Auth --
        env_list!("PORTICO_AUTH_ADMIN_EMAILS", self.auth.admin_emails);
        env_parse!("PORTICO_AUTH_PROVIDER", self.auth.provider);
        env_str!("PORTICO_AUTH_DEFAULT_AVATAR", self.auth.default_avatar);

        // -- Backend --
        env_str!("PORTICO_BACKEND_URL", self.backend.base_url);
        env_parse!("PORTICO_BACKEND_TIMEOUT_SECS", self.backend.timeout_secs);

        // -- Session --
        if let Ok(val) = std::env::var("PORTICO_SESSION_DIR") {
            self.session.dir = PathBuf::from(val);
        }

        // -- Logging --
        env_str!("PORTICO_LOG_LEVEL", self.logging.level);
        env_bool!("PORTICO_LOG_JSON", self.logging.json);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            backend: BackendConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4820);
        assert!(config.auth.admin_emails.is_empty());
        assert_eq!(config.auth.provider, ProviderMode::None);
        assert_eq!(config.session.storage_backend, StorageBackend::File);
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:4820");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            [auth]
            admin_emails = ["owner@example.com"]

            [backend]
            base_url = "https://api.example.com"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.admin_emails, vec!["owner@example.com"]);
        assert_eq!(config.backend.base_url, "https://api.example.com");
        // Untouched sections fall back to defaults.
        assert_eq!(config.server.port, 4820);
    }

    #[test]
    fn test_parse_storage_backend() {
        let toml = r#"
            [session]
            storage_backend = "memory"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.session.storage_backend, StorageBackend::Memory);
    }

    #[test]
    fn test_provider_mode_from_str() {
        assert_eq!(ProviderMode::from_str("none").unwrap(), ProviderMode::None);
        assert!(ProviderMode::from_str("bogus").is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/portico.toml")).unwrap();
        assert_eq!(config.server.port, 4820);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portico.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9000\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portico.toml");
        std::fs::write(&path, "this is not toml [[[").unwrap();
        assert!(Config::load(&path).is_err());
    }
}

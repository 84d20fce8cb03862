//! Application configuration module
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`schemalens.toml`, or the path in `SCHEMALENS_CONFIG`), then
//! `SCHEMALENS__SECTION__KEY` environment variables.

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "schemalens.toml";

#[derive(Error, Debug)]
#[allow(dead_code)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 3000,
        }
    }
}

/// MySQL login used for every environment once the tunnel is up
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    /// Host the forwarded port is bound on
    pub local_host: String,
    pub default_port: u16,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            username: "root".to_string(),
            password: String::new(),
            local_host: "127.0.0.1".to_string(),
            default_port: 3306,
            max_connections: 5,
            connect_timeout_secs: 10,
        }
    }
}

/// One named deployment environment reachable through a port-forwarding tunnel
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Bastion instance id passed to `--target`
    pub target: String,
    /// Database host as seen from the bastion
    pub host: String,
    pub region: String,
    pub local_port: u16,
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
}

fn default_remote_port() -> u16 {
    3306
}

/// Tunnel subprocess configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub enabled: bool,
    pub aws_binary: String,
    pub document_name: String,
    pub startup_wait_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            aws_binary: "aws".to_string(),
            document_name: "AWS-StartPortForwardingSessionToRemoteHost".to_string(),
            startup_wait_secs: 5,
        }
    }
}

/// Bounded retry for transient connection loss
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_ms: 2000,
        }
    }
}

/// ERD generation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ErdConfig {
    /// Name substrings that mark a table as an enum/lookup table
    pub enum_keywords: Vec<String>,
    pub max_columns_per_node: usize,
    pub dot_binary: String,
}

impl Default for ErdConfig {
    fn default() -> Self {
        Self {
            enum_keywords: crate::erd::filter::DEFAULT_ENUM_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            max_columns_per_node: 80,
            dot_binary: "dot".to_string(),
        }
    }
}

/// Code-reference scanner configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub extensions: Vec<String>,
    pub git_token: Option<String>,
    pub github_api: String,
    pub gitlab_api: String,
    pub org_workers: usize,
    pub org_budget_secs: u64,
    pub org_file_cap: usize,
    pub org_byte_cap: usize,
    pub repo_file_cap: usize,
    pub repo_byte_cap: usize,
    pub active_window_days: i64,
    pub active_repo_cap: usize,
    pub request_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            extensions: [".java", ".py", ".sql", ".js", ".ts"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            git_token: None,
            github_api: "https://api.github.com".to_string(),
            gitlab_api: "https://gitlab.com/api/v4".to_string(),
            org_workers: 5,
            org_budget_secs: 10,
            org_file_cap: 20,
            org_byte_cap: 5000,
            repo_file_cap: 50,
            repo_byte_cap: 10000,
            active_window_days: 180,
            active_repo_cap: 10,
            request_timeout_secs: 10,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub environments: BTreeMap<String, EnvironmentConfig>,
    pub tunnel: TunnelConfig,
    pub retry: RetryConfig,
    pub erd: ErdConfig,
    pub scanner: ScannerConfig,
    pub cors: CorsConfig,
}

impl Settings {
    /// Load settings from defaults, the optional config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let path = std::env::var("SCHEMALENS_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let env_source = Environment::with_prefix("SCHEMALENS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("cors.allowed_origins")
            .with_list_parse_key("erd.enum_keywords")
            .with_list_parse_key("scanner.extensions");

        let raw = Config::builder()
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            .add_source(env_source)
            .build()?;

        let mut settings: Settings = raw.try_deserialize()?;
        settings.apply_fallbacks();
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text only (no environment layering)
    #[allow(dead_code)]
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let raw = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Look up a configured environment by name (case-insensitive; the
    /// config crate may lowercase table keys)
    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, env)| env)
    }

    fn apply_fallbacks(&mut self) {
        if self.scanner.git_token.as_deref().map_or(true, str::is_empty) {
            self.scanner.git_token = std::env::var("GIT_TOKEN")
                .or_else(|_| std::env::var("GITHUB_TOKEN"))
                .ok()
                .filter(|t| !t.is_empty());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.org_workers == 0 {
            return Err(ConfigError::InvalidValue(
                "scanner.org_workers must be at least 1".to_string(),
            ));
        }
        if self.erd.max_columns_per_node == 0 {
            return Err(ConfigError::InvalidValue(
                "erd.max_columns_per_node must be at least 1".to_string(),
            ));
        }
        let mut ports = std::collections::HashSet::new();
        for (name, env) in &self.environments {
            if !ports.insert(env.local_port) {
                return Err(ConfigError::InvalidValue(format!(
                    "environment '{}' reuses local port {}",
                    name, env.local_port
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_default_retry_and_scanner_limits() {
        let settings = Settings::default();
        assert_eq!(settings.retry.max_retries, 2);
        assert_eq!(settings.scanner.org_workers, 5);
        assert_eq!(settings.scanner.org_file_cap, 20);
        assert_eq!(settings.scanner.active_repo_cap, 10);
        assert_eq!(settings.erd.max_columns_per_node, 80);
    }

    #[test]
    fn test_environments_from_toml() {
        let settings = Settings::from_toml(
            r#"
            [server]
            port = 8080

            [environments.QA]
            target = "i-0123"
            host = "qa-db.internal"
            region = "us-east-2"
            local_port = 3307
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        let qa = settings.environment("QA").unwrap();
        assert_eq!(qa.local_port, 3307);
        assert_eq!(qa.remote_port, 3306);
        assert_eq!(settings.database.default_port, 3306);
    }

    #[test]
    fn test_duplicate_local_ports_rejected() {
        let result = Settings::from_toml(
            r#"
            [environments.QA]
            target = "a"
            host = "a"
            region = "r"
            local_port = 3307

            [environments.UAT]
            target = "b"
            host = "b"
            region = "r"
            local_port = 3307
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}

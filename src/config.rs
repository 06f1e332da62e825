use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database location.
    pub database_url: String,
    /// Scheduler tick period; fractional seconds are allowed.
    pub poll_interval_seconds: f64,
    /// How long shutdown waits for in-flight runs.
    pub shutdown_grace_seconds: u64,
    /// Cap on outbound response bodies.
    pub max_response_bytes: usize,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            poll_interval_seconds: default_poll_interval(),
            shutdown_grace_seconds: default_shutdown_grace(),
            max_response_bytes: default_max_response_bytes(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults;
    /// `${VAR}` and `${VAR:-default}` references are expanded first.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(toml::from_str(&expanded)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_seconds.max(0.001))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Timeout applied to control-plane requests.
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_database_url() -> String {
    "sqlite://strobe.db".to_string()
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_max_response_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` (required) and `${VAR:-default}` (optional) references.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let reference = &rest[start + 2..];
        let Some(end) = reference.find('}') else {
            return Err(ConfigError::UnclosedVarReference);
        };

        let (name, default) = match reference[..end].split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (&reference[..end], None),
        };

        match std::env::var(name) {
            Ok(value) => result.push_str(&value),
            Err(_) => match default {
                Some(default) => result.push_str(default),
                None => return Err(ConfigError::MissingEnvVar(name.to_string())),
            },
        }

        rest = &reference[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.database_url, "sqlite://strobe.db");
        assert_eq!(config.poll_interval_seconds, 1.0);
        assert_eq!(config.shutdown_grace_seconds, 5);
        assert_eq!(config.max_response_bytes, 10 * 1024 * 1024);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_timeout_seconds, 30);
    }

    #[tokio::test]
    async fn missing_file_returns_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::load(dir.path().join("missing.toml")).await.unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
poll_interval_seconds = 0.25

[server]
port = 9090
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.poll_interval_seconds, 0.25);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database_url, "sqlite://strobe.db");
    }

    #[tokio::test]
    async fn invalid_toml_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "database_url = [broken").unwrap();
        assert!(Config::load(file.path()).await.is_err());
    }

    #[test]
    fn poll_interval_converts_fractional_seconds() {
        let config = Config {
            poll_interval_seconds: 0.5,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn expand_plain_text_is_untouched() {
        assert_eq!(expand_env_vars("no refs here").unwrap(), "no refs here");
    }

    #[test]
    fn expand_uses_default_when_unset() {
        // SAFETY: single-threaded test
        unsafe { std::env::remove_var("STROBE_TEST_UNSET") };
        let out = expand_env_vars("url = \"${STROBE_TEST_UNSET:-sqlite://fallback.db}\"").unwrap();
        assert_eq!(out, "url = \"sqlite://fallback.db\"");
    }

    #[test]
    fn expand_prefers_set_variable() {
        // SAFETY: single-threaded test
        unsafe { std::env::set_var("STROBE_TEST_SET", "from-env") };
        let out = expand_env_vars("${STROBE_TEST_SET:-ignored}").unwrap();
        assert_eq!(out, "from-env");
        unsafe { std::env::remove_var("STROBE_TEST_SET") };
    }

    #[test]
    fn expand_missing_required_errors() {
        // SAFETY: single-threaded test
        unsafe { std::env::remove_var("STROBE_TEST_MISSING") };
        let err = expand_env_vars("${STROBE_TEST_MISSING}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "STROBE_TEST_MISSING"));
    }

    #[test]
    fn expand_unclosed_reference_errors() {
        let err = expand_env_vars("value = ${OOPS").unwrap_err();
        assert!(matches!(err, ConfigError::UnclosedVarReference));
    }

    #[tokio::test]
    async fn load_expands_env_vars() {
        // SAFETY: single-threaded test
        unsafe { std::env::set_var("STROBE_TEST_DB", "sqlite://from-env.db") };

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "database_url = \"${{STROBE_TEST_DB}}\"").unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.database_url, "sqlite://from-env.db");

        unsafe { std::env::remove_var("STROBE_TEST_DB") };
    }
}

//! Configuration file support

use parley_sync::{ReconnectPolicy, SessionConfig};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SERVER_URL: &str = "ws://localhost:8000";

/// Configuration for parley
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat server base URL
    pub server_url: Option<String>,
    /// Our participant id on the server
    pub participant_id: Option<String>,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
}

/// Reconnection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

impl Config {
    /// `$PARLEY_CONFIG_PATH`, or `parley/config.toml` under the platform
    /// config directory
    pub fn path() -> PathBuf {
        match std::env::var_os("PARLEY_CONFIG_PATH") {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("parley")
                .join("config.toml"),
        }
    }

    /// Read the config file. A missing file yields defaults; an unreadable
    /// one is reported and ignored.
    pub fn load() -> Self {
        let path = Self::path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("Ignoring config {}: {}", path.display(), e);
                return Self::default();
            }
        };
        Self::parse(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring config {}: {}", path.display(), e);
            Self::default()
        })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Write a starter config unless one exists; returns its path
    pub fn init() -> io::Result<PathBuf> {
        let path = Self::path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// Build session settings, letting command-line values win over the file
    pub fn session_config(&self, server: Option<String>, participant: Option<String>) -> SessionConfig {
        SessionConfig {
            server_url: server
                .or_else(|| self.server_url.clone())
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            participant_id: participant.or_else(|| self.participant_id.clone()),
            reconnect: ReconnectPolicy {
                max_attempts: self.reconnect.max_attempts,
                base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            },
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# parley configuration file
# Place at ~/.config/parley/config.toml (Linux/Mac) or %APPDATA%\parley\config.toml (Windows)

# Chat server base URL (http/https are mapped to ws/wss)
server_url = "ws://localhost:8000"

# Your participant id on the server; typing frames carrying it are ignored
# participant_id = "42"

[reconnect]
# Reconnect attempts after an unexpected disconnect before giving up
max_attempts = 5
# Attempt n waits n * base_delay_ms
base_delay_ms = 1000
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(example_config()).unwrap();
        assert_eq!(config.server_url.as_deref(), Some("ws://localhost:8000"));
        assert_eq!(config.participant_id, None);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.base_delay_ms, 1000);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::parse("participant_id = \"7\"").unwrap();
        assert_eq!(config.participant_id.as_deref(), Some("7"));
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_flags_override_file() {
        let config = Config::parse(
            r#"
server_url = "https://chat.example.com"
participant_id = "7"

[reconnect]
max_attempts = 2
base_delay_ms = 250
"#,
        )
        .unwrap();

        let session = config.session_config(Some("ws://other:9000".into()), None);
        assert_eq!(session.server_url, "ws://other:9000");
        assert_eq!(session.participant_id.as_deref(), Some("7"));
        assert_eq!(session.reconnect.max_attempts, 2);
        assert_eq!(session.reconnect.delay_for_attempt(2), Duration::from_millis(500));
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        assert!(Config::parse("[reconnect]\nmax_attempts = \"many\"").is_err());
    }

    #[test]
    fn test_empty_config_falls_back_to_localhost() {
        let session = Config::default().session_config(None, None);
        assert_eq!(session.server_url, DEFAULT_SERVER_URL);
        assert_eq!(session.reconnect.max_attempts, 5);
    }
}

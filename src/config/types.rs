//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::{
    default_mechanism, default_port, default_realname, default_request_budget, default_username,
};
use super::validation::{self, ValidationError};
use crate::negotiate::{NegotiatorConfig, Registration, SaslConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server to connect to.
    pub server: ServerConfig,
    /// Registration details.
    pub identity: IdentityConfig,
    /// Capabilities to request.
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    /// Optional SASL credentials.
    pub sasl: Option<SaslSection>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// See [`validation::validate`].
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validation::validate(self)
    }

    /// Build the negotiation settings this config describes.
    pub fn negotiator_config(&self) -> NegotiatorConfig {
        NegotiatorConfig {
            request: self.capabilities.request.clone(),
            sasl: self.sasl.as_ref().map(|s| SaslConfig {
                username: s.username.clone(),
                password: s.password.clone(),
                mechanism: s.mechanism.clone(),
            }),
            timeout: self.capabilities.timeout_secs.map(Duration::from_secs),
            request_budget: self.capabilities.request_budget,
            registration: Some(self.identity.registration()),
        }
    }
}

/// Server address.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Hostname or IP address.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Nick, ident and realname sent at registration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub nickname: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_realname")]
    pub realname: String,
    /// Server password, sent as `PASS`.
    pub password: Option<String>,
}

impl IdentityConfig {
    pub fn registration(&self) -> Registration {
        Registration {
            nickname: self.nickname.clone(),
            username: self.username.clone(),
            realname: self.realname.clone(),
            password: self.password.clone(),
        }
    }
}

/// `[capabilities]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default)]
    pub request: Vec<String>,
    /// Per-wait timeout in seconds. Absent means wait forever.
    pub timeout_secs: Option<u64>,
    /// Byte budget for the names in one `CAP REQ` line.
    #[serde(default = "default_request_budget")]
    pub request_budget: usize,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            request: Vec::new(),
            timeout_secs: None,
            request_budget: default_request_budget(),
        }
    }
}

/// `[sasl]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SaslSection {
    pub username: String,
    pub password: String,
    #[serde(default = "default_mechanism")]
    pub mechanism: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
[server]
host = "irc.example.net"
port = 6697

[identity]
nickname = "checker"
password = "letmein"

[capabilities]
request = ["sasl", "multi-prefix"]
timeout_secs = 30

[sasl]
username = "alice"
password = "secret"
"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.address(), "irc.example.net:6697");
        assert_eq!(config.identity.username, "capab");
        assert_eq!(config.capabilities.request, vec!["sasl", "multi-prefix"]);
        assert_eq!(config.sasl.as_ref().unwrap().mechanism, "PLAIN");
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str(
            r#"
[server]
host = "localhost"

[identity]
nickname = "checker"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 6667);
        assert!(config.capabilities.request.is_empty());
        assert_eq!(config.capabilities.request_budget, 450);
        assert!(config.sasl.is_none());
    }

    #[test]
    fn test_negotiator_config() {
        let config: Config = toml::from_str(FULL).unwrap();
        let nc = config.negotiator_config();
        assert_eq!(nc.request, vec!["sasl", "multi-prefix"]);
        assert_eq!(nc.timeout, Some(Duration::from_secs(30)));
        assert_eq!(nc.sasl.unwrap().username, "alice");
        let reg = nc.registration.unwrap();
        assert_eq!(reg.nickname, "checker");
        assert_eq!(reg.password.as_deref(), Some("letmein"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/capab.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[server\nhost = 1").unwrap();
        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }
}

//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use crate::negotiate::MAX_REQUEST_BUDGET;
use capab_proto::SaslMechanism;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.host is required")]
    MissingHost,
    #[error("server.port must not be 0")]
    InvalidPort,
    #[error("identity.nickname is required")]
    MissingNickname,
    #[error("identity.nickname must not contain spaces or start with ':', got '{0}'")]
    InvalidNickname(String),
    #[error("capabilities.request_budget must be greater than 0")]
    ZeroRequestBudget,
    #[error("capabilities.request_budget must be at most {MAX_REQUEST_BUDGET}, got {0}")]
    RequestBudgetTooLarge(usize),
    #[error("capabilities.request contains an invalid name: '{0}'")]
    InvalidCapabilityName(String),
    #[error("sasl.username is required when [sasl] is present")]
    MissingSaslUsername,
    #[error("sasl.mechanism '{0}' is not supported, only PLAIN is")]
    UnsupportedMechanism(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::MissingHost);
    }
    if config.server.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }

    let nick = &config.identity.nickname;
    if nick.is_empty() {
        errors.push(ValidationError::MissingNickname);
    } else if nick.contains(' ') || nick.starts_with(':') {
        errors.push(ValidationError::InvalidNickname(nick.clone()));
    }

    match config.capabilities.request_budget {
        0 => errors.push(ValidationError::ZeroRequestBudget),
        n if n > MAX_REQUEST_BUDGET => errors.push(ValidationError::RequestBudgetTooLarge(n)),
        _ => {}
    }
    for name in &config.capabilities.request {
        if name.is_empty() || name.contains([' ', '=']) || name.len() >= MAX_REQUEST_BUDGET {
            errors.push(ValidationError::InvalidCapabilityName(name.clone()));
        }
    }

    if let Some(sasl) = &config.sasl {
        if sasl.username.is_empty() {
            errors.push(ValidationError::MissingSaslUsername);
        }
        if SaslMechanism::parse(&sasl.mechanism) != SaslMechanism::Plain {
            errors.push(ValidationError::UnsupportedMechanism(sasl.mechanism.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[server]
host = "irc.example.net"

[identity]
nickname = "checker"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let toml = r#"
[server]
host = ""
port = 0

[identity]
nickname = ""

[capabilities]
request = ["sasl", "bad name"]
request_budget = 0

[sasl]
username = ""
password = "x"
mechanism = "EXTERNAL"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 7);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingHost)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroRequestBudget)));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidCapabilityName(n) if n == "bad name")));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::UnsupportedMechanism(_))));
    }

    #[test]
    fn test_request_budget_must_fit_a_line() {
        let mut config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        config.capabilities.request_budget = MAX_REQUEST_BUDGET;
        assert!(validate(&config).is_ok());

        config.capabilities.request_budget = 600;
        config.capabilities.request = vec!["x".repeat(MAX_REQUEST_BUDGET)];
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::RequestBudgetTooLarge(600)));
        assert!(matches!(errors[1], ValidationError::InvalidCapabilityName(_)));
    }

    #[test]
    fn test_bad_nickname_fails() {
        let toml = r#"
[server]
host = "irc.example.net"

[identity]
nickname = ":oops"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidNickname(_))));
    }
}

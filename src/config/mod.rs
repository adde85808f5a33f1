//! Configuration loading and management.
//!
//! - [`types`]: config struct definitions and loading
//! - [`validation`]: startup checks that report every problem at once
//! - [`defaults`]: serde default functions

mod defaults;
mod types;
mod validation;

pub use types::{CapabilitiesConfig, Config, ConfigError, IdentityConfig, SaslSection, ServerConfig};
pub use validation::{validate, ValidationError};

//! Integration test common infrastructure.
//!
//! - [`script`]: in-process transport that answers lines on an [`EventBus`]
//! - [`server`]: scripted TCP server for end-to-end runs
//!
//! [`EventBus`]: slirc_capab::EventBus

#![allow(dead_code)]

pub mod script;
pub mod server;

#[allow(unused_imports)]
pub use script::{Rule, Script, ScriptedTransport};
#[allow(unused_imports)]
pub use server::FakeServer;

use slirc_capab::NegotiatorConfig;

/// Config requesting `names`, with no registration and no timeout.
pub fn request(names: &[&str]) -> NegotiatorConfig {
    NegotiatorConfig {
        request: names.iter().map(|s| s.to_string()).collect(),
        ..NegotiatorConfig::default()
    }
}

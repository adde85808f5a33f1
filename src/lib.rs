//! IRCv3 capability negotiation and SASL `PLAIN` for IRC clients.
//!
//! A [`Connection`] feeds every inbound line onto an [`EventBus`];
//! a [`Negotiator`] runs `CAP LS`/`REQ`/`ACK`, authenticates, installs the
//! `CAP NEW`/`DEL` listener, and ends with `CAP END`. The shared
//! [`CapabilityCatalog`] stays current for the life of the connection.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod negotiate;
pub mod transport;

pub use catalog::{Capability, CapabilityCatalog};
pub use connection::{Connection, ConnectionError};
pub use error::{ProtocolError, SaslFailure};
pub use events::{CallbackGuard, CallbackId, EventBus};
pub use negotiate::{
    NegotiationOutcome, Negotiator, NegotiatorConfig, Phase, Registration, SaslConfig, SaslResult,
};
pub use transport::{LineWriter, Transport, TransportError};

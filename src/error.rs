//! Error types for the negotiation front-end.
//!
//! Negotiation itself never returns `Err`: every failure ends in a terminal
//! [`Phase`](crate::negotiate::Phase) or [`SaslResult`](crate::negotiate::SaslResult).
//! These types carry the detail that gets logged on the way there.

use thiserror::Error;

pub use crate::transport::TransportError;

/// A server line that does not have the shape its command requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed {command} line: {line:?}")]
    Malformed { command: String, line: String },
}

impl ProtocolError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "protocol_malformed",
        }
    }
}

/// Why a SASL exchange failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaslFailure {
    #[error("cannot authenticate with empty username or password")]
    EmptyCredentials,

    #[error("server returned unexpected data {0:?}")]
    UnexpectedContinuation(String),

    #[error("server rejected the credentials")]
    ServerRejected,

    #[error("no SASL result received")]
    UnknownResult,

    #[error("server aborted the exchange")]
    Aborted,

    #[error("could not send AUTHENTICATE: {0}")]
    Transport(String),
}

impl SaslFailure {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyCredentials => "empty_credentials",
            Self::UnexpectedContinuation(_) => "unexpected_continuation",
            Self::ServerRejected => "server_rejected",
            Self::UnknownResult => "unknown_result",
            Self::Aborted => "aborted",
            Self::Transport(_) => "transport",
        }
    }
}

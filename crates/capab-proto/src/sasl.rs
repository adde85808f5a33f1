//! SASL helpers.
//!
//! Only `PLAIN` (RFC 4616) is encoded here; other mechanism names are
//! recognised so they can be reported, not used.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>

use std::fmt;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use zeroize::Zeroize;

/// Server continuation token asking for the client payload.
pub const CONTINUATION: &str = "+";

/// Longest payload fragment carried by one `AUTHENTICATE` line.
pub const SASL_CHUNK_SIZE: usize = 400;

/// SASL mechanism names.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    /// Username and password.
    Plain,
    /// TLS client certificate.
    External,
    /// SCRAM-SHA-256 challenge/response.
    ScramSha256,
    /// Anything else.
    Unknown(String),
}

impl SaslMechanism {
    /// Parse a mechanism name (case-insensitive).
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Self::Plain,
            "EXTERNAL" => Self::External,
            "SCRAM-SHA-256" => Self::ScramSha256,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Canonical name of this mechanism.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain => "PLAIN",
            Self::External => "EXTERNAL",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse the comma-separated mechanism list carried by the `sasl` capability.
pub fn parse_mechanisms(list: &str) -> Vec<SaslMechanism> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SaslMechanism::parse)
        .collect()
}

/// Encode `PLAIN` credentials with an empty authzid.
///
/// The payload is `NUL username NUL password`, base64 encoded without padding.
pub fn make_plain_auth(username: &str, password: &str) -> String {
    let mut payload = format!("\0{}\0{}", username, password);
    let encoded = STANDARD_NO_PAD.encode(payload.as_bytes());
    payload.zeroize();
    encoded
}

/// Split an encoded payload into `AUTHENTICATE` arguments.
///
/// A payload that is empty or an exact multiple of [`SASL_CHUNK_SIZE`] is
/// terminated with a lone `+`.
pub fn chunk_payload(encoded: &str) -> Vec<&str> {
    let mut chunks: Vec<&str> = Vec::with_capacity(encoded.len() / SASL_CHUNK_SIZE + 1);
    let mut rest = encoded;
    while rest.len() > SASL_CHUNK_SIZE {
        // base64 is ASCII, so any byte offset is a char boundary
        let (head, tail) = rest.split_at(SASL_CHUNK_SIZE);
        chunks.push(head);
        rest = tail;
    }
    if rest.len() == SASL_CHUNK_SIZE {
        chunks.push(rest);
        chunks.push(CONTINUATION);
    } else if rest.is_empty() {
        chunks.push(CONTINUATION);
    } else {
        chunks.push(rest);
    }
    chunks
}

//! `CAP` subcommands and capability tokens.
//!
//! # Reference
//! - IRCv3 capability negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>

use std::fmt;
use std::str::FromStr;

use crate::error::MessageParseError;

/// Protocol version sent with `CAP LS`.
pub const CAP_VERSION: &str = "302";

/// Subcommand of a `CAP` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CapSubCommand {
    /// List available capabilities.
    LS,
    /// List currently enabled capabilities.
    LIST,
    /// Request capabilities.
    REQ,
    /// Server granted a request.
    ACK,
    /// Server rejected a request.
    NAK,
    /// End of negotiation.
    END,
    /// Server advertises new capabilities (cap-notify).
    NEW,
    /// Server withdraws capabilities (cap-notify).
    DEL,
}

impl CapSubCommand {
    /// Wire form of this subcommand.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LS => "LS",
            Self::LIST => "LIST",
            Self::REQ => "REQ",
            Self::ACK => "ACK",
            Self::NAK => "NAK",
            Self::END => "END",
            Self::NEW => "NEW",
            Self::DEL => "DEL",
        }
    }
}

impl FromStr for CapSubCommand {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LS" => Ok(Self::LS),
            "LIST" => Ok(Self::LIST),
            "REQ" => Ok(Self::REQ),
            "ACK" => Ok(Self::ACK),
            "NAK" => Ok(Self::NAK),
            "END" => Ok(Self::END),
            "NEW" => Ok(Self::NEW),
            "DEL" => Ok(Self::DEL),
            _ => Err(MessageParseError::InvalidSubcommand {
                cmd: "CAP",
                sub: s.to_owned(),
            }),
        }
    }
}

impl fmt::Display for CapSubCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `name[=value]` entry from a capability list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapToken<'a> {
    /// Capability name, as sent.
    pub name: &'a str,
    /// Value after the first `=`, or empty.
    pub value: &'a str,
}

impl<'a> CapToken<'a> {
    /// Split a token on its first `=`.
    pub fn parse(token: &'a str) -> Self {
        match token.split_once('=') {
            Some((name, value)) => Self { name, value },
            None => Self { name: token, value: "" },
        }
    }
}

/// Iterate the tokens of a space-separated capability list.
pub fn split_tokens(list: &str) -> impl Iterator<Item = CapToken<'_>> {
    list.split_whitespace().map(CapToken::parse)
}

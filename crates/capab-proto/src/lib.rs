//! # capab-proto
//!
//! Wire-level building blocks for the client side of IRCv3 capability
//! negotiation: an owned IRC line model with a `nom` parser, `CAP`
//! subcommand and token decoding, the numerics the handshake reacts to,
//! and SASL `PLAIN` payload encoding.
//!
//! Nothing in this crate holds negotiation state.
//!
//! ```rust
//! use capab_proto::{CapSubCommand, Message};
//!
//! let msg: Message = ":irc.example.net CAP * LS :sasl=PLAIN multi-prefix".parse().unwrap();
//! assert_eq!(msg.command, "CAP");
//! assert_eq!(msg.param(1).and_then(|s| s.parse().ok()), Some(CapSubCommand::LS));
//! assert_eq!(msg.trailing(), Some("sasl=PLAIN multi-prefix"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod cap;
#[cfg(feature = "tokio")]
pub mod codec;
pub mod error;
pub mod message;
pub mod numeric;
pub mod sasl;

pub use self::cap::{split_tokens, CapSubCommand, CapToken, CAP_VERSION};
#[cfg(feature = "tokio")]
pub use self::codec::{CodecError, IrcCodec, Line, MAX_IRC_LINE_LEN};
pub use self::error::MessageParseError;
pub use self::message::{Message, Tag};
pub use self::sasl::{
    chunk_payload, make_plain_auth, parse_mechanisms, SaslMechanism, CONTINUATION, SASL_CHUNK_SIZE,
};

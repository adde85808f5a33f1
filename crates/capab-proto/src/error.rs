//! Error types for line parsing.

use thiserror::Error;

/// Failure to turn a raw line into a [`Message`](crate::Message).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageParseError {
    /// The line was empty (or only a line terminator).
    #[error("empty message")]
    EmptyMessage,

    /// The command was neither letters nor a three-digit numeric.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),

    /// The line did not follow `[@tags] [:prefix] <command> [params]`.
    #[error("syntax error at position {position}")]
    Syntax {
        /// Byte offset into the input where parsing stopped.
        position: usize,
    },

    /// Subcommand of a known command was not recognised.
    #[error("invalid {cmd} subcommand: {sub}")]
    InvalidSubcommand {
        /// The command the subcommand belongs to.
        cmd: &'static str,
        /// The offending subcommand.
        sub: String,
    },

    /// The line exceeded the codec's length limit and was discarded.
    #[error("line too long ({len} bytes)")]
    LineTooLong {
        /// Bytes dropped, terminator included.
        len: usize,
    },
}

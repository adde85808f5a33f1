//! Tokio line codec producing [`Message`]s.

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::MessageParseError;
use crate::message::Message;

/// Longest accepted inbound line, tags included.
pub const MAX_IRC_LINE_LEN: usize = 8191;

/// Failure reading or writing framed lines.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Underlying I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One inbound line: the raw text and its parse result.
///
/// A line that does not parse is still yielded so the reader can log it and
/// carry on instead of tearing the stream down. Invalid UTF-8 is replaced
/// lossily. An overlong line is dropped and reported as
/// [`MessageParseError::LineTooLong`] with an empty `raw`.
#[derive(Debug, Clone)]
pub struct Line {
    /// The line without its terminator.
    pub raw: String,
    /// Parsed form of `raw`.
    pub parsed: Result<Message, MessageParseError>,
}

impl Line {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw = String::from_utf8_lossy(bytes).into_owned();
        if raw.trim().is_empty() {
            return None;
        }
        let parsed = raw.parse::<Message>();
        Some(Self { raw, parsed })
    }

    fn too_long(len: usize) -> Self {
        Self {
            raw: String::new(),
            parsed: Err(MessageParseError::LineTooLong { len }),
        }
    }
}

/// Codec for IRC lines: `\n` or `\r\n` terminated on read, `\r\n` on write.
pub struct IrcCodec {
    max_len: usize,
    /// Bytes already scanned for `\n` in the current buffer.
    next_index: usize,
    /// Set while dropping the rest of an overlong line.
    discarded: Option<usize>,
}

impl IrcCodec {
    /// Create a codec with the default line limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_IRC_LINE_LEN)
    }

    /// Create a codec with a custom line limit in bytes.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len,
            next_index: 0,
            discarded: None,
        }
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_terminator(mut bytes: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = bytes {
        bytes = rest;
    }
    if let [rest @ .., b'\r'] = bytes {
        bytes = rest;
    }
    bytes
}

impl Decoder for IrcCodec {
    type Item = Line;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Line>, CodecError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if self.discarded.is_some() || src.len() > self.max_len {
                    *self.discarded.get_or_insert(0) += src.len();
                    src.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let frame = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if let Some(dropped) = self.discarded.take() {
                return Ok(Some(Line::too_long(dropped + frame.len())));
            }
            let content = strip_terminator(&frame);
            if content.len() > self.max_len {
                return Ok(Some(Line::too_long(frame.len())));
            }
            if let Some(line) = Line::from_bytes(content) {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Line>, CodecError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        let rest = src.split();
        self.next_index = 0;
        if let Some(dropped) = self.discarded.take() {
            return Ok(Some(Line::too_long(dropped + rest.len())));
        }
        if rest.len() > self.max_len {
            return Ok(Some(Line::too_long(rest.len())));
        }
        Ok(Line::from_bytes(strip_terminator(&rest)))
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let line = msg.to_string();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

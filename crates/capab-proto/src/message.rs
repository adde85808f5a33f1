//! Owned IRC line model and its parser.
//!
//! Parsing is done with `nom` over the line head (`[@tags] [:prefix] command`)
//! followed by a hand-rolled parameter scan, which keeps the trailing
//! parameter intact.

use std::fmt::{self, Write};
use std::str::FromStr;

use nom::{
    bytes::complete::{take_until, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
    IResult,
};

use crate::error::MessageParseError;

/// RFC 2812 limit on the number of parameters.
const MAX_PARAMS: usize = 15;

/// A single IRCv3 message tag: key and optional (unescaped) value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag(pub String, pub Option<String>);

/// An owned IRC message.
///
/// `command` is kept as the raw token (`CAP`, `AUTHENTICATE`, `001`, ...) so
/// that dispatch can happen on strings at the event boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// IRCv3 message tags, if the line carried any.
    pub tags: Option<Vec<Tag>>,
    /// Message source without the leading `:`.
    pub prefix: Option<String>,
    /// Command name or three-digit numeric.
    pub command: String,
    /// Parameters, the trailing one included as the last element.
    pub params: Vec<String>,
}

impl Message {
    /// Build an outgoing message with no tags or prefix.
    pub fn new(command: &str, args: &[&str]) -> Self {
        Self {
            tags: None,
            prefix: None,
            command: command.to_owned(),
            params: args.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    /// Parameter at `index`, if present.
    #[inline]
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The last parameter, which is where list content lives.
    #[inline]
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// True if this is the numeric reply `code` (e.g. `"001"`).
    #[inline]
    pub fn is_numeric(&self, code: &str) -> bool {
        self.command == code
    }
}

fn parse_tags(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_until(" "))(input)
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c: char| c != ' '))(input)
}

fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric())(input)
}

type Head<'a> = (Option<&'a str>, Option<&'a str>, &'a str);

fn parse_head(input: &str) -> IResult<&str, Head<'_>> {
    let (input, tags) = opt(parse_tags)(input)?;
    let (input, _) = space0(input)?;
    let (input, prefix) = opt(parse_prefix)(input)?;
    let (input, _) = space0(input)?;
    let (rest, command) = parse_command(input)?;
    Ok((rest, (tags, prefix, command)))
}

/// Split what follows the command into parameters.
///
/// Runs of spaces count as one separator; a `:` starts the trailing
/// parameter, which runs to the end of the line.
fn parse_params(mut rest: &str) -> Vec<String> {
    let mut params = Vec::new();

    while rest.starts_with(' ') && params.len() < MAX_PARAMS {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }

        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing.to_owned());
            break;
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(rest[..end].to_owned());
        rest = &rest[end..];
    }

    params
}

fn parse_tag_list(raw: &str) -> Vec<Tag> {
    raw.split(';')
        .filter(|t| !t.is_empty())
        .map(|t| {
            let mut kv = t.splitn(2, '=');
            let key = kv.next().unwrap_or_default().to_owned();
            let value = kv.next().map(unescape_tag_value);
            Tag(key, value)
        })
        .collect()
}

/// Reverse IRCv3 tag value escaping.
pub fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}

/// Apply IRCv3 tag value escaping.
pub fn escape_tag_value(f: &mut dyn Write, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            ';' => f.write_str("\\:")?,
            ' ' => f.write_str("\\s")?,
            '\\' => f.write_str("\\\\")?,
            '\r' => f.write_str("\\r")?,
            '\n' => f.write_str("\\n")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn is_valid_command(cmd: &str) -> bool {
    cmd.chars().all(|c| c.is_ascii_alphabetic())
        || (cmd.len() == 3 && cmd.chars().all(|c| c.is_ascii_digit()))
}

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let (rest, (tags, prefix, command)) = parse_head(line).map_err(|e| match e {
            nom::Err::Error(e) | nom::Err::Failure(e) => MessageParseError::Syntax {
                position: line.len() - e.input.len(),
            },
            nom::Err::Incomplete(_) => MessageParseError::Syntax {
                position: line.len(),
            },
        })?;

        if !is_valid_command(command) {
            return Err(MessageParseError::InvalidCommand(command.to_owned()));
        }
        if !rest.is_empty() && !rest.starts_with(' ') {
            return Err(MessageParseError::Syntax {
                position: line.len() - rest.len(),
            });
        }

        Ok(Message {
            tags: tags.map(parse_tag_list),
            prefix: prefix.map(str::to_owned),
            command: command.to_owned(),
            params: parse_params(rest),
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tags) = self.tags.as_deref().filter(|t| !t.is_empty()) {
            f.write_char('@')?;
            for (i, Tag(key, value)) in tags.iter().enumerate() {
                if i > 0 {
                    f.write_char(';')?;
                }
                f.write_str(key)?;
                if let Some(value) = value {
                    f.write_char('=')?;
                    escape_tag_value(f, value)?;
                }
            }
            f.write_char(' ')?;
        }

        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        f.write_str(&self.command)?;

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            f.write_char(' ')?;
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                f.write_char(':')?;
            }
            f.write_str(param)?;
        }

        Ok(())
    }
}

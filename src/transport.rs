//! Outbound line transport.

use capab_proto::Message;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// IRC line limit, CRLF excluded.
pub const MAX_LINE_LEN: usize = 510;

/// Failure to hand a line to the connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("line of {len} bytes exceeds the {MAX_LINE_LEN} byte limit")]
    LineTooLong { len: usize },

    #[error("connection closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frames and sends one command line.
///
/// Callers must keep the serialized line inside the 512 byte IRC limit;
/// splitting long lists is their job, not the transport's.
pub trait Transport: Send + Sync {
    fn write_command(&self, command: &str, args: &[&str]) -> Result<(), TransportError>;
}

/// Log an outgoing line at `trace`, keeping SASL payloads out of the log.
pub(crate) fn log_outgoing(msg: &Message) {
    if msg.command.eq_ignore_ascii_case("AUTHENTICATE")
        && msg.param(0).is_some_and(|p| p != "PLAIN" && p != "+" && p != "*")
    {
        trace!(line = "AUTHENTICATE <redacted>", "[<<]");
    } else {
        trace!(line = %msg, "[<<]");
    }
}

/// [`Transport`] that queues lines for the connection's writer task.
#[derive(Debug, Clone)]
pub struct LineWriter {
    tx: mpsc::UnboundedSender<Message>,
}

impl LineWriter {
    /// Create a writer and the queue its lines arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue an already built message.
    pub fn send(&self, msg: Message) -> Result<(), TransportError> {
        let len = msg.to_string().len();
        if len > MAX_LINE_LEN {
            return Err(TransportError::LineTooLong { len });
        }
        log_outgoing(&msg);
        self.tx.send(msg).map_err(|_| TransportError::Closed)
    }
}

impl Transport for LineWriter {
    fn write_command(&self, command: &str, args: &[&str]) -> Result<(), TransportError> {
        self.send(Message::new(command, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_command_queues_line() {
        let (writer, mut rx) = LineWriter::channel();
        writer.write_command("CAP", &["LS", "302"]).unwrap();
        assert_eq!(rx.try_recv().unwrap().to_string(), "CAP LS 302");
    }

    #[test]
    fn test_rejects_oversized_line() {
        let (writer, _rx) = LineWriter::channel();
        let long = "x".repeat(600);
        let err = writer.write_command("CAP", &["REQ", &long]).unwrap_err();
        assert!(matches!(err, TransportError::LineTooLong { .. }));
    }

    #[test]
    fn test_closed_queue() {
        let (writer, rx) = LineWriter::channel();
        drop(rx);
        assert!(matches!(
            writer.write_command("CAP", &["END"]),
            Err(TransportError::Closed)
        ));
    }
}

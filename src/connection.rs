//! Client connection: framed reader and writer tasks around one stream.
//!
//! ```text
//!   socket ──FramedRead──▶ reader task ──fire──▶ EventBus ──▶ handlers
//!                              │ PING
//!                              ▼
//!   socket ◀─FramedWrite── writer task ◀──mpsc── LineWriter (Transport)
//! ```

use capab_proto::{IrcCodec, Line, Message};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::events::EventBus;
use crate::transport::LineWriter;

/// Failure establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A running connection.
///
/// Dropping it stops both tasks.
pub struct Connection {
    bus: EventBus,
    writer: LineWriter,
    closed: watch::Receiver<bool>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Connection {
    /// Open a TCP connection to `server`.
    pub async fn connect(server: &ServerConfig) -> Result<Self, ConnectionError> {
        let addr = server.address();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: addr.clone(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "set_nodelay failed");
        }
        info!(addr = %addr, "Connected");
        Ok(Self::from_io(stream))
    }

    /// Run the connection over an already open stream.
    pub fn from_io<S>(io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let bus = EventBus::new();
        let (writer, queue) = LineWriter::channel();
        let (closed_tx, closed) = watch::channel(false);

        let reader_task = tokio::spawn(read_loop(
            FramedRead::new(read_half, IrcCodec::new()),
            bus.clone(),
            writer.clone(),
            closed_tx,
        ));
        let writer_task = tokio::spawn(write_loop(
            FramedWrite::new(write_half, IrcCodec::new()),
            queue,
        ));

        Self {
            bus,
            writer,
            closed,
            reader_task,
            writer_task,
        }
    }

    /// Bus every inbound message is fired on.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Handle for sending lines.
    pub fn transport(&self) -> LineWriter {
        self.writer.clone()
    }

    /// Resolves once the server side has closed or the read failed.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|done| *done).await;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &*self.closed.borrow())
            .finish_non_exhaustive()
    }
}

async fn read_loop<R>(
    mut reader: FramedRead<R, IrcCodec>,
    bus: EventBus,
    writer: LineWriter,
    closed: watch::Sender<bool>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(next) = reader.next().await {
        match next {
            Ok(Line {
                raw,
                parsed: Ok(msg),
            }) => {
                trace!(line = %raw, "[>>]");
                if msg.command.eq_ignore_ascii_case("PING") {
                    let args: Vec<&str> = msg.params.iter().map(String::as_str).collect();
                    if let Err(e) = writer.send(Message::new("PONG", &args)) {
                        warn!(error = %e, "Failed to answer PING");
                    }
                }
                bus.fire(&msg);
            }
            Ok(Line {
                raw,
                parsed: Err(e),
            }) => warn!(line = %raw, error = %e, "Discarding unparsable line"),
            // Only I/O failures surface as errors.
            Err(e) => {
                warn!(error = %e, "Read failed");
                break;
            }
        }
    }
    info!("Connection closed");
    let _ = closed.send(true);
}

async fn write_loop<W>(
    mut sink: FramedWrite<W, IrcCodec>,
    mut queue: mpsc::UnboundedReceiver<Message>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = queue.recv().await {
        if let Err(e) = sink.send(msg).await {
            warn!(error = %e, "Write failed");
            break;
        }
    }
    debug!("Writer finished");
}

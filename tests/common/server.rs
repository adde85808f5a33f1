//! Scripted TCP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Accepts one client and answers its lines from a prefix table.
pub struct FakeServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    done: Arc<Notify>,
    task: JoinHandle<()>,
}

impl FakeServer {
    /// Bind on an ephemeral port. `greeting` is written as soon as the client
    /// connects; `rules` map a line prefix to the raw replies for it.
    pub async fn spawn(greeting: &[&str], rules: &[(&str, &[&str])]) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received: Arc<Mutex<Vec<String>>> = Arc::default();
        let done = Arc::new(Notify::new());

        let greeting: Vec<String> = greeting.iter().map(|s| s.to_string()).collect();
        let mut rules: Vec<(String, Vec<String>)> = rules
            .iter()
            .map(|(p, r)| (p.to_string(), r.iter().map(|s| s.to_string()).collect()))
            .collect();

        let log = Arc::clone(&received);
        let finished = Arc::clone(&done);
        let task = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            for line in &greeting {
                if write_half.write_all(format!("{line}\r\n").as_bytes()).await.is_err() {
                    return;
                }
            }

            while let Ok(Some(line)) = lines.next_line().await {
                log.lock().push(line.clone());
                if let Some(i) = rules.iter().position(|(p, _)| line.starts_with(p.as_str())) {
                    let (_, replies) = rules.remove(i);
                    for reply in replies {
                        if write_half.write_all(format!("{reply}\r\n").as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
                finished.notify_one();
                if line.starts_with("QUIT") {
                    break;
                }
            }
        });

        Ok(Self {
            addr,
            received,
            done,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Lines received so far, without terminators.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Wait until a received line starts with `prefix`.
    pub async fn wait_for_line(&self, prefix: &str, limit: Duration) -> Result<()> {
        tokio::time::timeout(limit, async {
            loop {
                let notified = self.done.notified();
                if self.received().iter().any(|l| l.starts_with(prefix)) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("no line starting with {prefix:?} within {limit:?}"))
    }

    /// Close the client connection.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

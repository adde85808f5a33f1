//! IRCv3 capability negotiation driver.
//!
//! [`Negotiator::negotiate`] runs the whole pre-registration sequence on the
//! caller's task:
//!
//! 1. `CAP LS 302`, followed by registration if configured
//! 2. the [`Session`] loop over `CAP`/`001` lines, sending `CAP REQ` batches
//! 3. the `CAP` handler goes live for `NEW`/`DEL`
//! 4. SASL, when configured and granted
//! 5. `CAP END`, exactly once
//!
//! Inbound lines reach the loop through an unbounded queue filled by bus
//! callbacks, so the publisher never waits on negotiation and the catalog
//! lock is never held across an await. The `CAP` callback that fills the
//! queue is the same one that later serves live updates.

mod batch;
mod listener;
mod sasl;
mod session;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use capab_proto::numeric::RPL_WELCOME;
use capab_proto::{Message, CAP_VERSION};
use parking_lot::Mutex;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

pub use batch::{batch_requests, DEFAULT_REQUEST_BUDGET, MAX_REQUEST_BUDGET};
pub use listener::install as install_listener;
pub use sasl::SaslResult;
pub use session::{Phase, Session, Step};

use crate::catalog::{Capability, CapabilityCatalog};
use crate::events::{CallbackId, EventBus};
use crate::transport::{Transport, TransportError};

/// SASL credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslConfig {
    pub username: String,
    pub password: String,
    /// Only `PLAIN` is implemented.
    pub mechanism: String,
}

impl Default for SaslConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            mechanism: "PLAIN".to_owned(),
        }
    }
}

/// Connection registration sent right after `CAP LS`.
///
/// The server holds registration open until `CAP END`, but a server without
/// `CAP` support answers it with `001`, which ends negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub password: Option<String>,
}

impl Registration {
    /// Send `PASS` (if set), `NICK` and `USER`.
    pub fn send(&self, transport: &dyn Transport) -> Result<(), TransportError> {
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            transport.write_command("PASS", &[password])?;
        }
        transport.write_command("NICK", &[&self.nickname])?;
        transport.write_command("USER", &[&self.username, "0", "*", &self.realname])
    }
}

/// Settings for one negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatorConfig {
    /// Capability names to request, in order.
    pub request: Vec<String>,
    pub sasl: Option<SaslConfig>,
    /// Upper bound on every wait. `None` waits forever.
    pub timeout: Option<Duration>,
    /// See [`batch_requests`].
    pub request_budget: usize,
    pub registration: Option<Registration>,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            request: Vec::new(),
            sasl: None,
            timeout: None,
            request_budget: DEFAULT_REQUEST_BUDGET,
            registration: None,
        }
    }
}

/// Result of [`Negotiator::negotiate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationOutcome {
    pub phase: Phase,
    pub sasl: SaslResult,
    /// Acknowledged capabilities when negotiation finished.
    pub acknowledged: Vec<Capability>,
}

/// Drives negotiation for one connection.
pub struct Negotiator<T> {
    config: NegotiatorConfig,
    transport: T,
    bus: EventBus,
    catalog: Arc<CapabilityCatalog>,
    outcome: OnceCell<NegotiationOutcome>,
    phase: Mutex<Phase>,
    sasl: tokio::sync::Mutex<Option<SaslResult>>,
    listener: Mutex<Option<CallbackId>>,
}

impl<T: Transport> Negotiator<T> {
    pub fn new(config: NegotiatorConfig, transport: T, bus: EventBus) -> Self {
        let catalog = Arc::new(CapabilityCatalog::new(&config.request));
        Self {
            config,
            transport,
            bus,
            catalog,
            outcome: OnceCell::new(),
            phase: Mutex::new(Phase::NotStarted),
            sasl: tokio::sync::Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    /// Shared handle to the catalog.
    pub fn catalog(&self) -> Arc<CapabilityCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Capabilities currently acknowledged.
    pub fn available_caps(&self) -> Vec<Capability> {
        self.catalog.snapshot_acknowledged()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Id of the `CAP` handler, once negotiation has started.
    pub fn listener_id(&self) -> Option<CallbackId> {
        *self.listener.lock()
    }

    /// Run negotiation, SASL and `CAP END`.
    ///
    /// Only the first call does anything. Every other call, concurrent or
    /// later, waits for that run and returns the same outcome. If the running
    /// call is cancelled, the next call starts over. With an empty request
    /// list nothing is sent and the phase stays [`Phase::NotStarted`].
    pub async fn negotiate(&self) -> NegotiationOutcome {
        if self.outcome.initialized() {
            debug!("negotiate called again, returning recorded outcome");
        }
        self.outcome.get_or_init(|| self.run()).await.clone()
    }

    async fn run(&self) -> NegotiationOutcome {
        if self.config.request.is_empty() {
            debug!("No capabilities requested, skipping negotiation");
            return self.summary(SaslResult::NotAttempted);
        }

        let phase = self.run_session().await;
        info!(phase = ?phase, "Capability negotiation finished");

        let sasl = self.run_sasl().await;
        if sasl != SaslResult::NotAttempted {
            info!(result = %sasl, "SASL finished");
        }

        if let Err(e) = self.transport.write_command("CAP", &["END"]) {
            warn!(error = %e, "Failed to send CAP END");
        }

        self.summary(sasl)
    }

    /// Run the SASL step. Later calls return the first result unchanged.
    pub async fn run_sasl(&self) -> SaslResult {
        let mut slot = self.sasl.lock().await;
        if let Some(result) = slot.as_ref() {
            return result.clone();
        }
        let result = sasl::authenticate(
            &self.transport,
            &self.bus,
            &self.catalog,
            self.config.sasl.as_ref(),
            self.config.timeout,
        )
        .await;
        *slot = Some(result.clone());
        result
    }

    async fn run_session(&self) -> Phase {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let (id, handover) =
            listener::install_queued(&self.bus, Arc::clone(&self.catalog), tx.clone());
        *self.listener.lock() = Some(id);
        let _welcome = self.bus.guard(
            RPL_WELCOME,
            move |msg| {
                let _ = tx.send(msg.clone());
            },
            false,
        );

        let mut session = Session::new(Arc::clone(&self.catalog), self.config.request_budget);
        match self.start(&mut session) {
            Ok(()) => self.set_phase(session.phase()),
            Err(e) => {
                warn!(error = %e, "Failed to start negotiation");
                session.abort(Phase::Aborted);
            }
        }

        while !session.phase().is_terminal() {
            let next = match bounded(self.config.timeout, rx.recv()).await {
                Some(next) => next,
                None => {
                    warn!(phase = ?session.phase(), "Timed out waiting for the server");
                    session.abort(Phase::TimedOut);
                    break;
                }
            };
            let Some(msg) = next else {
                session.abort(Phase::Aborted);
                break;
            };

            match session.handle(&msg) {
                Ok(Step::Request(lines)) => {
                    if let Err(e) = self.send_requests(&lines) {
                        warn!(error = %e, "Failed to send CAP REQ");
                        session.abort(Phase::Aborted);
                    }
                }
                Ok(Step::Continue | Step::Finished) => {}
                Err(e) => warn!(error = %e, code = e.error_code(), "Aborting negotiation"),
            }
            self.set_phase(session.phase());
        }

        handover.go_live(&mut rx);
        self.set_phase(session.phase());
        session.phase()
    }

    fn start(&self, session: &mut Session) -> Result<(), TransportError> {
        self.transport.write_command("CAP", &["LS", CAP_VERSION])?;
        session.start();
        if let Some(registration) = &self.config.registration {
            registration.send(&self.transport)?;
        }
        Ok(())
    }

    fn send_requests(&self, lines: &[String]) -> Result<(), TransportError> {
        for line in lines {
            self.transport.write_command("CAP", &["REQ", line])?;
        }
        Ok(())
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    fn summary(&self, sasl: SaslResult) -> NegotiationOutcome {
        NegotiationOutcome {
            phase: self.phase(),
            sasl,
            acknowledged: self.catalog.snapshot_acknowledged(),
        }
    }
}

impl<T> std::fmt::Debug for Negotiator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiator")
            .field("config", &self.config)
            .field("phase", &*self.phase.lock())
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

/// Await `fut`, giving up after `limit` if one is set.
pub(crate) async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

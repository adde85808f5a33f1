//! Sans-IO negotiation state machine.
//!
//! The session consumes inbound `CAP` and `001` lines and tells the caller
//! what to send next. It never blocks and never holds the catalog lock
//! between calls.

use std::sync::Arc;

use capab_proto::numeric::RPL_WELCOME;
use capab_proto::{CapSubCommand, Message};
use tracing::{debug, info, warn};

use super::batch::{batch_requests, MAX_REQUEST_BUDGET};
use crate::catalog::CapabilityCatalog;
use crate::error::ProtocolError;

/// Where a negotiation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing sent yet.
    NotStarted,
    /// `CAP LS 302` sent, collecting the listing.
    AwaitingLs,
    /// `CAP REQ` sent, collecting `ACK`/`NAK`.
    AwaitingAck,
    /// All requests answered.
    Done,
    /// The server does not speak `CAP`, or sent a line we cannot use.
    Unsupported,
    /// A bounded wait ran out.
    TimedOut,
    /// A line could not be written.
    Aborted,
}

impl Phase {
    /// True once negotiation has ended, for whatever reason.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Unsupported | Self::TimedOut | Self::Aborted
        )
    }
}

/// What the driver should do after feeding a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep waiting for lines.
    Continue,
    /// Send one `CAP REQ` per line, then keep waiting.
    Request(Vec<String>),
    /// Negotiation reached a terminal phase.
    Finished,
}

/// State for one negotiation run.
#[derive(Debug)]
pub struct Session {
    catalog: Arc<CapabilityCatalog>,
    request_budget: usize,
    phase: Phase,
    incoming: Vec<String>,
    pending_requests: usize,
}

impl Session {
    /// `request_budget` is clamped to `1..=MAX_REQUEST_BUDGET`.
    pub fn new(catalog: Arc<CapabilityCatalog>, request_budget: usize) -> Self {
        Self {
            catalog,
            request_budget: request_budget.clamp(1, MAX_REQUEST_BUDGET),
            phase: Phase::NotStarted,
            incoming: Vec::new(),
            pending_requests: 0,
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// `REQ` lines sent whose answer has not arrived yet.
    #[inline]
    pub fn pending_requests(&self) -> usize {
        self.pending_requests
    }

    /// Mark `CAP LS` as sent.
    pub fn start(&mut self) {
        self.phase = Phase::AwaitingLs;
    }

    /// End the session early with a terminal `phase`.
    pub fn abort(&mut self, phase: Phase) {
        debug_assert!(phase.is_terminal());
        self.incoming.clear();
        self.phase = phase;
    }

    /// Feed one inbound line.
    ///
    /// A `CAP` line with fewer than two parameters ends the session as
    /// [`Phase::Unsupported`] and is reported as an error.
    pub fn handle(&mut self, msg: &Message) -> Result<Step, ProtocolError> {
        if self.phase.is_terminal() {
            return Ok(Step::Finished);
        }

        if msg.is_numeric(RPL_WELCOME) {
            warn!("Got unexpected 001. Assuming the server does not support capabilities");
            self.abort(Phase::Unsupported);
            return Ok(Step::Finished);
        }

        if !msg.command.eq_ignore_ascii_case("CAP") {
            return Ok(Step::Continue);
        }

        let Some(sub) = msg.param(1) else {
            self.abort(Phase::Unsupported);
            return Err(ProtocolError::Malformed {
                command: msg.command.clone(),
                line: msg.to_string(),
            });
        };

        let more_coming = msg.param(2) == Some("*");
        let list = if msg.params.len() >= 3 {
            msg.trailing().unwrap_or_default()
        } else {
            ""
        };

        match sub.parse::<CapSubCommand>() {
            Ok(CapSubCommand::LS) => Ok(self.on_ls(list, more_coming)),
            Ok(CapSubCommand::ACK) => Ok(self.on_ack(list)),
            Ok(CapSubCommand::NAK) => Ok(self.on_nak(list)),
            Ok(CapSubCommand::NEW) => {
                self.catalog.apply_new(list);
                Ok(Step::Continue)
            }
            Ok(CapSubCommand::DEL) => {
                self.catalog.apply_del(list);
                Ok(Step::Continue)
            }
            Ok(other) => {
                debug!(subcommand = %other, "ignoring CAP subcommand during negotiation");
                Ok(Step::Continue)
            }
            Err(_) => {
                info!(subcommand = %sub, "Unknown CAP command, ignoring");
                Ok(Step::Continue)
            }
        }
    }

    fn on_ls(&mut self, list: &str, more_coming: bool) -> Step {
        if self.phase != Phase::AwaitingLs {
            debug!("ignoring CAP LS outside of listing phase");
            return Step::Continue;
        }

        self.incoming.extend(list.split_whitespace().map(str::to_owned));
        if more_coming {
            return Step::Continue;
        }

        info!(caps = ?self.incoming, "Server offered caps");
        self.catalog.merge_offered(self.incoming.iter().map(String::as_str));
        self.incoming.clear();

        let mut wanted = self.catalog.request_set();
        wanted.retain(|name| {
            let fits = name.len() < MAX_REQUEST_BUDGET;
            if !fits {
                warn!(len = name.len(), "Capability name cannot fit in a CAP REQ line, skipping");
            }
            fits
        });
        if wanted.is_empty() {
            info!("No requested capabilities offered, nothing to request");
            self.phase = Phase::Done;
            return Step::Finished;
        }

        let lines = batch_requests(&wanted, self.request_budget);
        info!(caps = ?wanted, lines = lines.len(), "Requesting capabilities");
        self.pending_requests += lines.len();
        self.phase = Phase::AwaitingAck;
        Step::Request(lines)
    }

    fn on_ack(&mut self, list: &str) -> Step {
        if self.phase != Phase::AwaitingAck {
            warn!(caps = %list, "CAP ACK without an outstanding request, ignoring");
            return Step::Continue;
        }

        self.incoming.extend(list.split_whitespace().map(str::to_owned));
        self.pending_requests = self.pending_requests.saturating_sub(1);
        self.finish_if_answered()
    }

    fn on_nak(&mut self, list: &str) -> Step {
        if self.phase != Phase::AwaitingAck {
            warn!(caps = %list, "CAP NAK without an outstanding request, ignoring");
            return Step::Continue;
        }

        warn!(caps = %list, "Server rejected caps");
        self.catalog.reject(list.split_whitespace());
        self.pending_requests = self.pending_requests.saturating_sub(1);
        self.finish_if_answered()
    }

    fn finish_if_answered(&mut self) -> Step {
        if self.pending_requests > 0 {
            return Step::Continue;
        }

        let unknown = self.catalog.acknowledge(self.incoming.iter().map(String::as_str));
        for name in &unknown {
            warn!(cap = %name, "Got an ACK for a CAP we dont know about! ignoring!");
        }
        info!(caps = ?self.incoming, "Server ack'd caps");

        self.incoming.clear();
        self.phase = Phase::Done;
        Step::Finished
    }
}

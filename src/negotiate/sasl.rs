//! SASL `PLAIN` exchange, run after capability negotiation.

use std::time::Duration;

use capab_proto::numeric::{
    ERR_NICKLOCKED, ERR_SASLABORTED, ERR_SASLFAIL, ERR_SASLTOOLONG, RPL_LOGGEDIN, RPL_SASLMECHS,
    RPL_SASLSUCCESS, SASL_OUTCOMES,
};
use capab_proto::{
    chunk_payload, make_plain_auth, parse_mechanisms, Message, SaslMechanism, CONTINUATION,
};
use tracing::{debug, info, warn};

use super::{bounded, SaslConfig};
use crate::catalog::CapabilityCatalog;
use crate::error::SaslFailure;
use crate::events::EventBus;
use crate::transport::Transport;

/// How the SASL step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslResult {
    /// No SASL configured; nothing was sent.
    NotAttempted,
    /// The server did not grant the `sasl` capability.
    Unsupported,
    /// Neither side can use `PLAIN`.
    MechanismUnsupported,
    /// `903` received.
    Success,
    Failed(SaslFailure),
    /// A bounded wait ran out.
    TimedOut,
}

impl std::fmt::Display for SaslResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAttempted => f.write_str("not attempted"),
            Self::Unsupported => f.write_str("not supported by server"),
            Self::MechanismUnsupported => f.write_str("mechanism not supported by server"),
            Self::Success => f.write_str("success"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

enum Reply {
    Continuation(Message),
    Outcome(Message),
}

/// Decide whether SASL can run, and run it.
pub(super) async fn authenticate(
    transport: &dyn Transport,
    bus: &EventBus,
    catalog: &CapabilityCatalog,
    config: Option<&SaslConfig>,
    limit: Option<Duration>,
) -> SaslResult {
    let Some(config) = config else {
        return SaslResult::NotAttempted;
    };

    let Some(sasl_cap) = catalog.get("sasl").filter(|c| c.acknowledged) else {
        info!("Server did not acknowledge sasl, skipping authentication");
        return SaslResult::Unsupported;
    };

    if config.username.is_empty() || config.password.is_empty() {
        return SaslResult::Failed(SaslFailure::EmptyCredentials);
    }

    if SaslMechanism::parse(&config.mechanism) != SaslMechanism::Plain {
        warn!(mechanism = %config.mechanism, "Only PLAIN is implemented");
        return SaslResult::MechanismUnsupported;
    }

    let offered = parse_mechanisms(&sasl_cap.value);
    if !offered.contains(&SaslMechanism::Plain) {
        warn!(offered = %sasl_cap.value, "Server does not offer PLAIN");
        return SaslResult::MechanismUnsupported;
    }

    plain(transport, bus, &config.username, &config.password, limit).await
}

async fn plain(
    transport: &dyn Transport,
    bus: &EventBus,
    username: &str,
    password: &str,
    limit: Option<Duration>,
) -> SaslResult {
    // Every guard unregisters its listeners on every return path.
    let (mut outcome_rx, _outcome) = bus.first_of_guarded(SASL_OUTCOMES);
    let (continuation_rx, _continuation) = bus.first_of_guarded(&["AUTHENTICATE"]);
    let _logged_in = bus.guard(
        RPL_LOGGEDIN,
        |msg| info!(account = msg.param(2), "Logged in"),
        false,
    );
    let _mechanisms = bus.guard(
        RPL_SASLMECHS,
        |msg| debug!(mechanisms = msg.param(1), "Server lists SASL mechanisms"),
        false,
    );

    if let Err(e) = transport.write_command("AUTHENTICATE", &[SaslMechanism::Plain.as_str()]) {
        return SaslResult::Failed(SaslFailure::Transport(e.to_string()));
    }

    let first = bounded(limit, async {
        tokio::select! {
            biased;
            msg = continuation_rx => msg.map(Reply::Continuation),
            msg = &mut outcome_rx => msg.map(Reply::Outcome),
        }
    })
    .await;

    match first {
        None => {
            warn!("Timed out waiting for AUTHENTICATE continuation");
            return SaslResult::TimedOut;
        }
        Some(Err(_)) => return SaslResult::Failed(SaslFailure::UnknownResult),
        Some(Ok(Reply::Outcome(msg))) => {
            // A result before credentials were sent can only be a refusal.
            return match outcome_of(&msg) {
                SaslResult::Success => {
                    SaslResult::Failed(SaslFailure::UnexpectedContinuation(msg.command))
                }
                other => other,
            };
        }
        Some(Ok(Reply::Continuation(msg))) => {
            let data = msg.trailing().unwrap_or_default();
            if data != CONTINUATION {
                warn!(data = %data, "Server returned unexpected data");
                return SaslResult::Failed(SaslFailure::UnexpectedContinuation(data.to_owned()));
            }
        }
    }

    let encoded = make_plain_auth(username, password);
    for chunk in chunk_payload(&encoded) {
        if let Err(e) = transport.write_command("AUTHENTICATE", &[chunk]) {
            return SaslResult::Failed(SaslFailure::Transport(e.to_string()));
        }
    }
    debug!("Sent PLAIN credentials");

    match bounded(limit, outcome_rx).await {
        None => {
            warn!("Timed out waiting for SASL result");
            SaslResult::TimedOut
        }
        Some(Err(_)) => SaslResult::Failed(SaslFailure::UnknownResult),
        Some(Ok(msg)) => outcome_of(&msg),
    }
}

fn outcome_of(msg: &Message) -> SaslResult {
    let reason = msg.trailing().unwrap_or_default();
    match msg.command.as_str() {
        RPL_SASLSUCCESS => {
            info!("SASL authentication successful");
            SaslResult::Success
        }
        ERR_SASLFAIL | ERR_NICKLOCKED | ERR_SASLTOOLONG => {
            warn!(numeric = %msg.command, reason, "SASL authentication failed");
            SaslResult::Failed(SaslFailure::ServerRejected)
        }
        ERR_SASLABORTED => {
            warn!(reason, "SASL authentication aborted");
            SaslResult::Failed(SaslFailure::Aborted)
        }
        _ => SaslResult::Failed(SaslFailure::UnknownResult),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use parking_lot::Mutex;

    /// Records lines and answers them on the bus from a script.
    struct Scripted {
        bus: EventBus,
        sent: Mutex<Vec<String>>,
        replies: Mutex<Vec<(&'static str, &'static str)>>,
    }

    impl Scripted {
        fn new(bus: &EventBus, replies: &[(&'static str, &'static str)]) -> Self {
            Self {
                bus: bus.clone(),
                sent: Mutex::default(),
                replies: Mutex::new(replies.to_vec()),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }
    }

    impl Transport for Scripted {
        fn write_command(&self, command: &str, args: &[&str]) -> Result<(), TransportError> {
            let line = Message::new(command, args).to_string();
            self.sent.lock().push(line.clone());
            let reply = {
                let mut replies = self.replies.lock();
                replies
                    .iter()
                    .position(|(prefix, _)| line.starts_with(prefix))
                    .map(|i| replies.remove(i).1)
            };
            if let Some(reply) = reply {
                self.bus.fire(&reply.parse().unwrap());
            }
            Ok(())
        }
    }

    fn catalog(value: &str, acknowledged: bool) -> CapabilityCatalog {
        let catalog = CapabilityCatalog::new(["sasl"]);
        catalog.upsert_available("sasl", value);
        if acknowledged {
            catalog.acknowledge(["sasl"]);
        }
        catalog
    }

    fn config(username: &str, password: &str) -> SaslConfig {
        SaslConfig {
            username: username.to_owned(),
            password: password.to_owned(),
            ..SaslConfig::default()
        }
    }

    #[tokio::test]
    async fn test_plain_success() {
        let bus = EventBus::new();
        let t = Scripted::new(
            &bus,
            &[
                ("AUTHENTICATE PLAIN", "AUTHENTICATE +"),
                ("AUTHENTICATE AGFs", ":srv 903 alice :SASL authentication successful"),
            ],
        );
        let cat = catalog("PLAIN,EXTERNAL", true);

        let res = authenticate(&t, &bus, &cat, Some(&config("alice", "secret")), None).await;
        assert_eq!(res, SaslResult::Success);
        assert_eq!(
            t.sent(),
            vec![
                "AUTHENTICATE PLAIN".to_owned(),
                format!("AUTHENTICATE {}", make_plain_auth("alice", "secret")),
            ]
        );
        assert_eq!(bus.callback_count("903"), 0);
        assert_eq!(bus.callback_count("904"), 0);
        assert_eq!(bus.callback_count("AUTHENTICATE"), 0);
    }

    #[tokio::test]
    async fn test_server_rejects() {
        let bus = EventBus::new();
        let t = Scripted::new(
            &bus,
            &[
                ("AUTHENTICATE PLAIN", "AUTHENTICATE +"),
                ("AUTHENTICATE AGFs", ":srv 904 alice :SASL authentication failed"),
            ],
        );
        let cat = catalog("PLAIN", true);
        let res = authenticate(&t, &bus, &cat, Some(&config("alice", "secret")), None).await;
        assert_eq!(res, SaslResult::Failed(SaslFailure::ServerRejected));
        assert_eq!(bus.callback_count("903"), 0);
    }

    #[tokio::test]
    async fn test_unexpected_continuation_sends_no_credentials() {
        let bus = EventBus::new();
        let t = Scripted::new(&bus, &[("AUTHENTICATE PLAIN", "AUTHENTICATE :nope")]);
        let cat = catalog("PLAIN", true);
        let res = authenticate(&t, &bus, &cat, Some(&config("alice", "secret")), None).await;
        assert_eq!(res, SaslResult::Failed(SaslFailure::UnexpectedContinuation("nope".into())));
        assert_eq!(t.sent(), vec!["AUTHENTICATE PLAIN"]);
    }

    #[tokio::test]
    async fn test_gates_before_traffic() {
        let bus = EventBus::new();
        let t = Scripted::new(&bus, &[]);

        let cat = catalog("PLAIN", true);
        assert_eq!(authenticate(&t, &bus, &cat, None, None).await, SaslResult::NotAttempted);

        let cat = catalog("PLAIN", false);
        let res = authenticate(&t, &bus, &cat, Some(&config("alice", "secret")), None).await;
        assert_eq!(res, SaslResult::Unsupported);

        let cat = catalog("PLAIN", true);
        let res = authenticate(&t, &bus, &cat, Some(&config("", "secret")), None).await;
        assert_eq!(res, SaslResult::Failed(SaslFailure::EmptyCredentials));

        let cat = catalog("EXTERNAL", true);
        let res = authenticate(&t, &bus, &cat, Some(&config("alice", "secret")), None).await;
        assert_eq!(res, SaslResult::MechanismUnsupported);

        let mut external = config("alice", "secret");
        external.mechanism = "EXTERNAL".into();
        let cat = catalog("PLAIN,EXTERNAL", true);
        let res = authenticate(&t, &bus, &cat, Some(&external), None).await;
        assert_eq!(res, SaslResult::MechanismUnsupported);

        assert!(t.sent().is_empty());
    }

    #[tokio::test]
    async fn test_abort_before_continuation_ends_without_timeout() {
        let bus = EventBus::new();
        let t = Scripted::new(&bus, &[("AUTHENTICATE PLAIN", ":srv 906 alice :SASL aborted")]);
        let cat = catalog("PLAIN", true);
        let res = authenticate(&t, &bus, &cat, Some(&config("alice", "secret")), None).await;
        assert_eq!(res, SaslResult::Failed(SaslFailure::Aborted));
        assert_eq!(t.sent(), vec!["AUTHENTICATE PLAIN"]);
        assert_eq!(bus.callback_count("906"), 0);
    }

    #[tokio::test]
    async fn test_nick_locked_is_rejection() {
        let bus = EventBus::new();
        let t = Scripted::new(
            &bus,
            &[
                ("AUTHENTICATE PLAIN", "AUTHENTICATE +"),
                ("AUTHENTICATE AGFs", ":srv 902 alice :You must use a nick assigned to you"),
            ],
        );
        let cat = catalog("PLAIN", true);
        let res = authenticate(&t, &bus, &cat, Some(&config("alice", "secret")), None).await;
        assert_eq!(res, SaslResult::Failed(SaslFailure::ServerRejected));
        assert_eq!(bus.callback_count("902"), 0);
        assert_eq!(bus.callback_count("900"), 0);
    }

    #[tokio::test]
    async fn test_timeout_unregisters_listeners() {
        let bus = EventBus::new();
        let t = Scripted::new(&bus, &[]);
        let cat = catalog("PLAIN", true);
        let res = authenticate(
            &t,
            &bus,
            &cat,
            Some(&config("alice", "secret")),
            Some(Duration::from_millis(20)),
        )
        .await;
        assert_eq!(res, SaslResult::TimedOut);
        assert_eq!(bus.callback_count("AUTHENTICATE"), 0);
        assert_eq!(bus.callback_count("904"), 0);
    }
}

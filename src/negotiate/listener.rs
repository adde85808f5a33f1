//! Live `CAP NEW` / `CAP DEL` handling.
//!
//! During negotiation every `CAP` line is queued for the session so lines are
//! seen in arrival order. Once the session ends, [`Handover::go_live`] applies
//! whatever `NEW`/`DEL` is still queued and switches the same callback to
//! updating the catalog inline.

use std::sync::Arc;

use capab_proto::{CapSubCommand, Message};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::catalog::CapabilityCatalog;
use crate::events::{CallbackId, EventBus};

/// Register the live-update handler on `bus` for the rest of the connection.
///
/// The handler runs inline on the publisher so `NEW` and `DEL` for the same
/// name are applied in arrival order.
pub fn install(bus: &EventBus, catalog: Arc<CapabilityCatalog>) -> CallbackId {
    bus.add_callback("CAP", move |msg| on_cap(&catalog, msg), false)
}

enum Route {
    Queue(mpsc::UnboundedSender<Message>),
    Live,
}

/// Switch for a handler installed with [`install_queued`].
pub(super) struct Handover {
    route: Arc<Mutex<Route>>,
    catalog: Arc<CapabilityCatalog>,
}

/// Register the `CAP` handler in queueing mode, forwarding every line to `tx`.
pub(super) fn install_queued(
    bus: &EventBus,
    catalog: Arc<CapabilityCatalog>,
    tx: mpsc::UnboundedSender<Message>,
) -> (CallbackId, Handover) {
    let route = Arc::new(Mutex::new(Route::Queue(tx)));
    let handler_route = Arc::clone(&route);
    let handler_catalog = Arc::clone(&catalog);
    let id = bus.add_callback(
        "CAP",
        move |msg| match &*handler_route.lock() {
            Route::Queue(tx) => {
                let _ = tx.send(msg.clone());
            }
            Route::Live => on_cap(&handler_catalog, msg),
        },
        false,
    );
    (id, Handover { route, catalog })
}

impl Handover {
    /// Apply the `NEW`/`DEL` lines left in `rx`, then handle later lines inline.
    ///
    /// The route stays locked throughout, so a line fired meanwhile waits and
    /// is applied after the queued ones.
    pub(super) fn go_live(self, rx: &mut mpsc::UnboundedReceiver<Message>) {
        let mut route = self.route.lock();
        while let Ok(msg) = rx.try_recv() {
            if msg.command.eq_ignore_ascii_case("CAP") {
                on_cap(&self.catalog, &msg);
            }
        }
        *route = Route::Live;
    }
}

fn on_cap(catalog: &CapabilityCatalog, msg: &Message) {
    let Some(sub) = msg.param(1) else {
        warn!(line = %msg, "malformed CAP line, ignoring");
        return;
    };
    let list = if msg.params.len() >= 3 {
        msg.trailing().unwrap_or_default()
    } else {
        ""
    };

    match sub.parse::<CapSubCommand>() {
        Ok(CapSubCommand::NEW) => catalog.apply_new(list),
        Ok(CapSubCommand::DEL) => catalog.apply_del(list),
        _ => trace!(subcommand = %sub, "ignoring CAP after negotiation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire(bus: &EventBus, line: &str) {
        bus.fire(&line.parse().unwrap());
    }

    #[test]
    fn test_new_and_del_update_catalog() {
        let bus = EventBus::new();
        let catalog = Arc::new(CapabilityCatalog::new(["away-notify"]));
        catalog.merge_offered(["away-notify"]);
        catalog.acknowledge(["away-notify"]);
        install(&bus, Arc::clone(&catalog));

        fire(&bus, ":srv CAP nick DEL :away-notify");
        assert!(catalog.snapshot_acknowledged().is_empty());

        fire(&bus, ":srv CAP nick NEW :away-notify extended-join=v2");
        let away = catalog.get("away-notify").unwrap();
        assert!(away.available && !away.acknowledged);
        let join = catalog.get("extended-join").unwrap();
        assert_eq!(join.value, "v2");
        assert!(!join.requested);
    }

    #[test]
    fn test_other_subcommands_ignored() {
        let bus = EventBus::new();
        let catalog = Arc::new(CapabilityCatalog::new(["sasl"]));
        install(&bus, Arc::clone(&catalog));

        fire(&bus, ":srv CAP nick LS :sasl batch");
        fire(&bus, ":srv CAP nick ACK :sasl");
        fire(&bus, ":srv CAP nick");
        assert_eq!(catalog.len(), 1);
        assert!(catalog.snapshot_acknowledged().is_empty());
    }

    #[test]
    fn test_handover_applies_queued_then_live() {
        let bus = EventBus::new();
        let catalog = Arc::new(CapabilityCatalog::new(["away-notify"]));
        catalog.merge_offered(["away-notify"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_, handover) = install_queued(&bus, Arc::clone(&catalog), tx);

        fire(&bus, ":srv CAP nick ACK :away-notify");
        fire(&bus, ":srv CAP nick NEW :chghost");
        assert!(catalog.get("chghost").is_none());

        // the session consumes its ACK, the NEW is left behind
        let ack = rx.try_recv().unwrap();
        assert_eq!(ack.param(1), Some("ACK"));
        catalog.acknowledge(["away-notify"]);

        handover.go_live(&mut rx);
        assert!(catalog.get("chghost").unwrap().available);

        fire(&bus, ":srv CAP nick DEL :away-notify");
        assert!(catalog.snapshot_acknowledged().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_stops_updates() {
        let bus = EventBus::new();
        let catalog = Arc::new(CapabilityCatalog::new(Vec::<String>::new()));
        let id = install(&bus, Arc::clone(&catalog));
        bus.remove_callback(id);
        fire(&bus, ":srv CAP nick NEW :chghost");
        assert!(catalog.is_empty());
    }
}

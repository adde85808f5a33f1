//! Command-keyed publish/subscribe bus for inbound lines.
//!
//! Handlers are keyed by command name (ASCII case-insensitive) and fire in
//! registration order. The registry lock is released before any handler runs,
//! so a handler may add or remove callbacks, including itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use capab_proto::Message;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

/// Handle returned by callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

#[derive(Clone)]
struct Registered {
    id: CallbackId,
    concurrent: bool,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<String, Vec<Registered>>>,
}

impl Inner {
    fn reserve_id(&self) -> CallbackId {
        CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn insert(&self, command: &str, entry: Registered) {
        self.callbacks
            .lock()
            .entry(command.to_ascii_uppercase())
            .or_default()
            .push(entry);
    }

    fn remove(&self, id: CallbackId) {
        let mut callbacks = self.callbacks.lock();
        for list in callbacks.values_mut() {
            list.retain(|r| r.id != id);
        }
        callbacks.retain(|_, list| !list.is_empty());
    }
}

/// Event substrate feeding protocol lines to interested handlers.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistent handler for `command`.
    ///
    /// With `concurrent`, firing hands the handler off without blocking the
    /// publisher.
    pub fn add_callback<F>(&self, command: &str, handler: F, concurrent: bool) -> CallbackId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.inner.reserve_id();
        self.inner.insert(
            command,
            Registered {
                id,
                concurrent,
                handler: Arc::new(handler),
            },
        );
        id
    }

    /// Unregister a handler. Unknown or already removed ids are ignored.
    pub fn remove_callback(&self, id: CallbackId) {
        self.inner.remove(id);
    }

    /// Register a handler that runs at most once and then unregisters itself.
    pub fn add_one_shot_callback<F>(
        &self,
        command: &str,
        handler: F,
        concurrent: bool,
    ) -> CallbackId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.inner.reserve_id();
        let registry: Weak<Inner> = Arc::downgrade(&self.inner);
        let fired = AtomicBool::new(false);

        let wrapper = move |msg: &Message| {
            if fired.swap(true, Ordering::AcqRel) {
                return;
            }
            handler(msg);
            if let Some(inner) = registry.upgrade() {
                inner.remove(id);
            }
        };

        self.inner.insert(
            command,
            Registered {
                id,
                concurrent,
                handler: Arc::new(wrapper),
            },
        );
        id
    }

    /// Receive the next `command` message exactly once.
    pub fn wait_for(&self, command: &str) -> oneshot::Receiver<Message> {
        self.first_of(&[command])
    }

    /// Race single-fire listeners for each of `commands` into one slot.
    ///
    /// The first to fire delivers its message and unregisters its siblings.
    /// If nothing ever fires the listeners stay registered; use
    /// [`EventBus::first_of_guarded`] to tie their lifetime to a guard.
    pub fn first_of(&self, commands: &[&str]) -> oneshot::Receiver<Message> {
        let (rx, guard) = self.first_of_guarded(commands);
        guard.disarm();
        rx
    }

    /// Like [`EventBus::first_of`], returning a guard that unregisters every
    /// listener when dropped.
    pub fn first_of_guarded(&self, commands: &[&str]) -> (oneshot::Receiver<Message>, FirstOf) {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        let siblings: Arc<Mutex<Vec<CallbackId>>> = Arc::default();

        let mut ids = Vec::with_capacity(commands.len());
        for command in commands {
            let slot = Arc::clone(&slot);
            let siblings = Arc::clone(&siblings);
            let registry = Arc::downgrade(&self.inner);
            let id = self.add_one_shot_callback(
                command,
                move |msg| {
                    let Some(tx) = slot.lock().take() else {
                        return;
                    };
                    let _ = tx.send(msg.clone());
                    if let Some(inner) = registry.upgrade() {
                        for id in siblings.lock().iter() {
                            inner.remove(*id);
                        }
                    }
                },
                false,
            );
            ids.push(id);
        }
        siblings.lock().extend(ids.iter().copied());

        // A listener may have fired before every sibling was registered.
        if slot.lock().is_none() {
            for id in &ids {
                self.inner.remove(*id);
            }
        }

        let guard = FirstOf {
            bus: self.clone(),
            ids,
            armed: true,
        };
        (rx, guard)
    }

    /// Deliver `msg` to every handler registered for its command.
    pub fn fire(&self, msg: &Message) {
        let key = msg.command.to_ascii_uppercase();
        let handlers: Vec<Registered> = match self.inner.callbacks.lock().get(&key) {
            Some(list) => list.clone(),
            None => return,
        };
        trace!(command = %key, handlers = handlers.len(), "firing");

        for entry in handlers {
            if entry.concurrent {
                let msg = msg.clone();
                let handler = entry.handler;
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn_blocking(move || handler(&msg));
                    }
                    Err(_) => {
                        std::thread::spawn(move || handler(&msg));
                    }
                }
            } else {
                (entry.handler)(msg);
            }
        }
    }

    /// Number of handlers currently registered for `command`.
    pub fn callback_count(&self, command: &str) -> usize {
        self.inner
            .callbacks
            .lock()
            .get(&command.to_ascii_uppercase())
            .map_or(0, Vec::len)
    }

    /// Register a persistent handler and return a guard that removes it on drop.
    pub fn guard<F>(&self, command: &str, handler: F, concurrent: bool) -> CallbackGuard
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        CallbackGuard {
            bus: self.clone(),
            id: self.add_callback(command, handler, concurrent),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let callbacks = self.inner.callbacks.lock();
        f.debug_struct("EventBus")
            .field("commands", &callbacks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Removes its callback when dropped.
#[must_use = "dropping the guard unregisters the callback"]
pub struct CallbackGuard {
    bus: EventBus,
    id: CallbackId,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        self.bus.remove_callback(self.id);
    }
}

/// Listener set created by [`EventBus::first_of_guarded`].
#[must_use = "dropping the guard unregisters the listeners"]
pub struct FirstOf {
    bus: EventBus,
    ids: Vec<CallbackId>,
    armed: bool,
}

impl FirstOf {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FirstOf {
    fn drop(&mut self) {
        if self.armed {
            for id in &self.ids {
                self.bus.remove_callback(*id);
            }
        }
    }
}

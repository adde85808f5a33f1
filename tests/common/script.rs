//! Scripted in-process server.

use std::sync::Arc;

use capab_proto::Message;
use parking_lot::Mutex;
use slirc_capab::{EventBus, Transport, TransportError};

type Respond = Box<dyn Fn(&Message) -> Vec<String> + Send + Sync>;

/// Answer lines starting with `prefix`.
pub struct Rule {
    prefix: String,
    once: bool,
    respond: Respond,
}

/// Ordered reply rules. The first matching rule answers a line.
#[derive(Default)]
pub struct Script {
    rules: Vec<Rule>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the first line starting with `prefix` with `replies`.
    pub fn on(mut self, prefix: &str, replies: &[&str]) -> Self {
        let replies: Vec<String> = replies.iter().map(|s| s.to_string()).collect();
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            once: true,
            respond: Box::new(move |_| replies.clone()),
        });
        self
    }

    /// Answer every line starting with `prefix` with whatever `respond` builds.
    pub fn on_each<F>(mut self, prefix: &str, respond: F) -> Self
    where
        F: Fn(&Message) -> Vec<String> + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            once: false,
            respond: Box::new(respond),
        });
        self
    }

    fn answer(&mut self, line: &str, msg: &Message) -> Vec<String> {
        let Some(index) = self.rules.iter().position(|r| line.starts_with(&r.prefix)) else {
            return Vec::new();
        };
        let replies = (self.rules[index].respond)(msg);
        if self.rules[index].once {
            self.rules.remove(index);
        }
        replies
    }
}

/// [`Transport`] that records every line and fires scripted replies on a bus.
#[derive(Clone)]
pub struct ScriptedTransport {
    bus: EventBus,
    sent: Arc<Mutex<Vec<String>>>,
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new(bus: &EventBus, script: Script) -> Self {
        Self {
            bus: bus.clone(),
            sent: Arc::default(),
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Every line written so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Lines whose command is `command`.
    pub fn sent_command(&self, command: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|l| l.split(' ').next() == Some(command))
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn write_command(&self, command: &str, args: &[&str]) -> Result<(), TransportError> {
        let msg = Message::new(command, args);
        let line = msg.to_string();
        self.sent.lock().push(line.clone());

        // The script lock is released before firing so handlers may write.
        let replies = self.script.lock().answer(&line, &msg);
        for reply in replies {
            let reply: Message = reply.parse().expect("script reply must parse");
            self.bus.fire(&reply);
        }
        Ok(())
    }
}

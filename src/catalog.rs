//! Capability catalog shared by negotiation and the live-update listener.
//!
//! Rows are only ever appended; `DEL` clears flags instead of removing the
//! row. Every read-modify-write runs under one lock, and nothing outside this
//! module sees a row except as an owned copy.

use capab_proto::{split_tokens, CapToken};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// One capability known for this connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// Protocol token, compared byte-for-byte.
    pub name: String,
    /// Data from the `name=value` form, empty if none.
    pub value: String,
    /// The server currently advertises it.
    pub available: bool,
    /// The caller asked for it when the catalog was built.
    pub requested: bool,
    /// The server granted it with `ACK`.
    pub acknowledged: bool,
}

impl Capability {
    fn wanted(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: String::new(),
            available: false,
            requested: true,
            acknowledged: false,
        }
    }

    fn offered(token: &CapToken<'_>) -> Self {
        Self {
            name: token.name.to_owned(),
            value: token.value.to_owned(),
            available: true,
            requested: false,
            acknowledged: false,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// The catalog rows, only reachable while the catalog lock is held.
#[derive(Debug, Default)]
struct Rows(Vec<Capability>);

impl Rows {
    /// Linear scan for an exact name match.
    fn lookup(&self, name: &str) -> Option<&Capability> {
        self.0.iter().find(|c| c.name == name)
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Capability> {
        self.0.iter_mut().find(|c| c.name == name)
    }

    /// Mark `name` available with `value`, appending an unrequested row if
    /// the name is new.
    fn upsert_available(&mut self, name: &str, value: &str) {
        match self.lookup_mut(name) {
            Some(cap) => {
                cap.available = true;
                cap.value = value.to_owned();
            }
            None => self.0.push(Capability::offered(&CapToken { name, value })),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }
}

/// Mutex-protected capability catalog.
#[derive(Debug, Default)]
pub struct CapabilityCatalog {
    rows: Mutex<Rows>,
}

impl CapabilityCatalog {
    /// Build a catalog with one requested row per name, in order.
    ///
    /// Duplicate names collapse into the first row.
    pub fn new<I, S>(requested: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rows = Rows::default();
        for name in requested {
            let name = name.as_ref();
            if !name.is_empty() && rows.lookup(name).is_none() {
                rows.0.push(Capability::wanted(name));
            }
        }
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Owned copy of the row for `name`.
    pub fn get(&self, name: &str) -> Option<Capability> {
        self.rows.lock().lookup(name).cloned()
    }

    /// Mark `name` available with `value`, appending an unrequested row if
    /// the name is new.
    pub fn upsert_available(&self, name: &str, value: &str) {
        self.rows.lock().upsert_available(name, value);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.lock().0.len()
    }

    /// True if the catalog has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.lock().0.is_empty()
    }

    /// Copies of every acknowledged row.
    pub fn snapshot_acknowledged(&self) -> Vec<Capability> {
        self.rows
            .lock()
            .iter()
            .filter(|c| c.acknowledged)
            .cloned()
            .collect()
    }

    /// Copies of every row.
    pub fn snapshot(&self) -> Vec<Capability> {
        self.rows.lock().0.clone()
    }

    /// Names that are both requested and currently available.
    pub fn request_set(&self) -> Vec<String> {
        self.rows
            .lock()
            .iter()
            .filter(|c| c.requested && c.available)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Merge an `LS` token list (`name[=value]` tokens).
    pub fn merge_offered<'a>(&self, tokens: impl IntoIterator<Item = &'a str>) {
        let mut rows = self.rows.lock();
        for token in tokens {
            let token = CapToken::parse(token);
            rows.upsert_available(token.name, token.value);
        }
    }

    /// Set `acknowledged` on every named row. Returns the names with no row.
    ///
    /// A granted row is also marked available, so `acknowledged` never
    /// outlives `available`.
    pub fn acknowledge<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut rows = self.rows.lock();
        let mut unknown = Vec::new();
        for name in names {
            match rows.lookup_mut(name) {
                Some(cap) => {
                    cap.available = true;
                    cap.acknowledged = true;
                }
                None => unknown.push(name.to_owned()),
            }
        }
        unknown
    }

    /// Clear `acknowledged` on every named row.
    pub fn reject<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let mut rows = self.rows.lock();
        for name in names {
            if let Some(cap) = rows.lookup_mut(name) {
                cap.acknowledged = false;
            }
        }
    }

    /// Apply a `CAP NEW` list. New names are not requested.
    pub fn apply_new(&self, list: &str) {
        let mut rows = self.rows.lock();
        for token in split_tokens(list) {
            debug!(cap = %token.name, value = %token.value, "CAP NEW");
            rows.upsert_available(token.name, token.value);
        }
    }

    /// Apply a `CAP DEL` list. Unknown names are logged and skipped.
    pub fn apply_del(&self, list: &str) {
        let mut rows = self.rows.lock();
        for token in split_tokens(list) {
            match rows.lookup_mut(token.name) {
                Some(cap) => {
                    debug!(cap = %cap.name, "CAP DEL");
                    cap.available = false;
                    cap.acknowledged = false;
                }
                None => warn!(cap = %token.name, "unknown cap DELeted"),
            }
        }
    }
}

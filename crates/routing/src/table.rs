use std::{collections::HashMap, fmt};

use serde::Serialize;

use crate::normalize::{SourceKey, is_numeric_id};

/// Destination chat of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ChatTarget {
    /// Numeric chat identifier (e.g. `-1001234567890`).
    Id(i64),
    /// Opaque handle, passed to the platform as-is.
    Handle(String),
}

impl ChatTarget {
    /// Parse a trimmed `Target Group ID` cell.
    ///
    /// Numeric values (optionally negative) that fit in an `i64` become
    /// [`ChatTarget::Id`]; everything else is kept as an opaque handle.
    /// Returns `None` for an empty cell.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let numeric = !raw.starts_with('+') && is_numeric_id(raw);
        match raw.parse::<i64>() {
            Ok(id) if numeric => Some(Self::Id(id)),
            _ => Some(Self::Handle(raw.to_string())),
        }
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Handle(handle) => f.write_str(handle),
        }
    }
}

/// Forum topic inside a destination chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ThreadId(i32);

impl ThreadId {
    pub fn new(id: i32) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    /// Parse a trimmed `Topic ID` cell. Anything that is not a positive
    /// run of digits means "top level".
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        raw.parse::<i32>().ok().and_then(Self::new)
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One destination attached to a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub destination: ChatTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadId>,
}

impl RouteEntry {
    pub fn new(destination: ChatTarget, thread: Option<ThreadId>) -> Self {
        Self {
            destination,
            thread,
        }
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread {
            Some(thread) => write!(f, "{} (topic {thread})", self.destination),
            None => write!(f, "{}", self.destination),
        }
    }
}

/// Immutable mapping from source keys to their ordered destinations.
///
/// Built once per synchronization cycle through [`RouteTableBuilder`] and
/// never mutated afterwards. Every key maps to at least one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: HashMap<SourceKey, Vec<RouteEntry>>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    /// Entries for `key`, in the order they were configured.
    pub fn get(&self, key: &SourceKey) -> Option<&[RouteEntry]> {
        self.routes.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.routes.contains_key(key)
    }

    /// Number of distinct source keys.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Total number of entries across all sources.
    pub fn entry_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Routes sorted by source key, for stable display.
    pub fn sorted(&self) -> Vec<(&SourceKey, &[RouteEntry])> {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .map(|(key, entries)| (key, entries.as_slice()))
            .collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        routes
    }
}

/// Accumulates entries for a [`RouteTable`] under construction.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    routes: HashMap<SourceKey, Vec<RouteEntry>>,
}

impl RouteTableBuilder {
    /// Append `entry` to the list for `key`. Empty keys are ignored and
    /// reported as `false`.
    pub fn push(&mut self, key: SourceKey, entry: RouteEntry) -> bool {
        if key.is_empty() {
            return false;
        }
        self.routes.entry(key).or_default().push(entry);
        true
    }

    pub fn build(self) -> RouteTable {
        RouteTable {
            routes: self.routes,
        }
    }
}

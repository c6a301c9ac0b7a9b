use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::table::RouteTable;

/// Holder of the current [`RouteTable`].
///
/// The synchronizer is the only writer and replaces the whole table at once;
/// dispatchers take one [`snapshot`](Self::snapshot) per event and keep it
/// for the duration of that event.
#[derive(Debug)]
pub struct RouteTableStore {
    current: ArcSwap<RouteTable>,
}

impl RouteTableStore {
    /// Store holding an empty table.
    pub fn new() -> Self {
        Self::with_table(RouteTable::default())
    }

    pub fn with_table(table: RouteTable) -> Self {
        Self {
            current: ArcSwap::from_pointee(table),
        }
    }

    /// Stable reference to the table in force right now.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Replace the current table; returns the superseded one.
    pub fn publish(&self, table: RouteTable) -> Arc<RouteTable> {
        self.current.swap(Arc::new(table))
    }
}

impl Default for RouteTableStore {
    fn default() -> Self {
        Self::new()
    }
}

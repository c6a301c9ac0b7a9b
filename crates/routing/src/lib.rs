//! Route inbound chat messages to destinations listed in a routing sheet.
//!
//! The [`RouteSynchronizer`] periodically rebuilds a [`RouteTable`] from a
//! [`RowSource`] and publishes it into a [`RouteTableStore`]. The
//! [`Dispatcher`] reads one snapshot of that store per inbound event and hands
//! every matching destination to a [`Forwarder`].
//!
//! Lookup precedence for an inbound chat:
//! 1. Public handle (`@name`)
//! 2. Numeric chat id
//! 3. Link-style spelling of the handle (`t.me/name`)

pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod store;
pub mod sync;
pub mod table;

pub use {
    dispatch::{DispatchReport, Dispatcher, ForwardOutcome, Forwarder, InboundEvent},
    error::{Error, Result},
    normalize::{SourceKey, normalize},
    store::RouteTableStore,
    sync::{RouteSynchronizer, RowOutcome, RowSource, SheetRow, SyncReport, build_route_table},
    table::{ChatTarget, RouteEntry, RouteTable, ThreadId},
};

//! Periodic reconciliation of the route table against the routing sheet.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::FutureExt,
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    error::panic_message,
    normalize::{SourceKey, normalize},
    store::RouteTableStore,
    table::{ChatTarget, RouteEntry, RouteTable, ThreadId},
};

pub const COLUMN_SOURCE: &str = "Source Channel";
pub const COLUMN_TARGET: &str = "Target Group ID";
pub const COLUMN_TOPIC: &str = "Topic ID";
pub const COLUMN_STATUS: &str = "Status";

/// Header names every routing sheet must carry.
pub const EXPECTED_COLUMNS: [&str; 4] = [COLUMN_SOURCE, COLUMN_TARGET, COLUMN_TOPIC, COLUMN_STATUS];

/// Status value that marks a row as active.
pub const DEFAULT_ACTIVE_STATUS: &str = "aktif";

/// Delay between two synchronization cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(600);

/// One raw row of the routing sheet. Missing cells are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow {
    pub source_channel: String,
    pub target_group_id: String,
    pub topic_id: String,
    pub status: String,
}

impl SheetRow {
    pub fn new(
        source_channel: impl Into<String>,
        target_group_id: impl Into<String>,
        topic_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            source_channel: source_channel.into(),
            target_group_id: target_group_id.into(),
            topic_id: topic_id.into(),
            status: status.into(),
        }
    }
}

/// Read access to the external routing sheet.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch every row of the routing tab.
    ///
    /// Must fail, rather than return partial data, when any of
    /// [`EXPECTED_COLUMNS`] is missing.
    async fn fetch_rows(&self) -> anyhow::Result<Vec<SheetRow>>;
}

/// What happened to a single row while building a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Accepted(RouteEntry),
    Inactive,
    MissingSource,
    MissingTarget,
}

/// Summary of one synchronization cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub rows: usize,
    pub accepted: usize,
    pub inactive: usize,
    pub missing_source: usize,
    pub missing_target: usize,
    pub sources: usize,
    pub entries: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: &RowOutcome) {
        self.rows += 1;
        match outcome {
            RowOutcome::Accepted(_) => self.accepted += 1,
            RowOutcome::Inactive => self.inactive += 1,
            RowOutcome::MissingSource => self.missing_source += 1,
            RowOutcome::MissingTarget => self.missing_target += 1,
        }
    }
}

/// Classify one row. Status is checked first so that inactive rows are
/// never reported as malformed.
pub fn evaluate_row(row: &SheetRow, active_status: &str) -> (Option<SourceKey>, RowOutcome) {
    if !row.status.trim().eq_ignore_ascii_case(active_status.trim()) {
        return (None, RowOutcome::Inactive);
    }
    let key = normalize(&row.source_channel);
    if key.is_empty() {
        return (None, RowOutcome::MissingSource);
    }
    let Some(destination) = ChatTarget::parse(&row.target_group_id) else {
        return (None, RowOutcome::MissingTarget);
    };
    let entry = RouteEntry::new(destination, ThreadId::parse(&row.topic_id));
    (Some(key), RowOutcome::Accepted(entry))
}

/// Build a fresh table from raw rows.
///
/// Rows for the same source are all kept, in row order.
pub fn build_route_table(rows: &[SheetRow], active_status: &str) -> (RouteTable, SyncReport) {
    let mut builder = RouteTable::builder();
    let mut report = SyncReport::default();

    for (index, row) in rows.iter().enumerate() {
        let (key, outcome) = evaluate_row(row, active_status);
        report.record(&outcome);
        match (key, outcome) {
            (Some(key), RowOutcome::Accepted(entry)) => {
                debug!(row = index, source = %key, destination = %entry, "route accepted");
                builder.push(key, entry);
            },
            (_, RowOutcome::Inactive) => {},
            (_, outcome) => {
                debug!(row = index, ?outcome, "skipping incomplete routing row");
            },
        }
    }

    let table = builder.build();
    report.sources = table.len();
    report.entries = table.entry_count();
    (table, report)
}

/// Keeps a [`RouteTableStore`] in step with a [`RowSource`].
pub struct RouteSynchronizer {
    source: Arc<dyn RowSource>,
    store: Arc<RouteTableStore>,
    interval: Duration,
    active_status: String,
}

impl RouteSynchronizer {
    pub fn new(source: Arc<dyn RowSource>, store: Arc<RouteTableStore>) -> Self {
        Self {
            source,
            store,
            interval: DEFAULT_SYNC_INTERVAL,
            active_status: DEFAULT_ACTIVE_STATUS.to_string(),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_active_status(mut self, status: impl Into<String>) -> Self {
        self.active_status = status.into();
        self
    }

    /// Fetch, build and publish once.
    ///
    /// On error nothing is published and the previous table stays in force.
    /// A panicking source counts as a failed fetch.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let rows = match AssertUnwindSafe(self.source.fetch_rows())
            .catch_unwind()
            .await
        {
            Ok(fetched) => fetched.map_err(Error::fetch)?,
            Err(panic) => {
                return Err(Error::fetch(anyhow::anyhow!(
                    "row source panicked: {}",
                    panic_message(panic.as_ref())
                )));
            },
        };
        let (table, report) = build_route_table(&rows, &self.active_status);
        self.store.publish(table);
        Ok(report)
    }

    /// Run cycles until `cancel` fires. Fetch failures are logged and only
    /// skip one publish.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "route synchronizer started");
        loop {
            debug!("synchronizing routing sheet");
            match self.sync_once().await {
                Ok(report) => info!(
                    sources = report.sources,
                    entries = report.entries,
                    rows = report.rows,
                    inactive = report.inactive,
                    skipped = report.missing_source + report.missing_target,
                    "route table published"
                ),
                Err(e) => {
                    let kept = self.store.snapshot().len();
                    warn!(error = %e, kept_sources = kept, "routing sync failed, keeping previous table");
                },
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {},
            }
        }
        info!("route synchronizer stopped");
    }
}

//! Match inbound events against the current route table and forward them.

use std::{panic::AssertUnwindSafe, sync::Arc};

use {
    async_trait::async_trait,
    futures::FutureExt,
    tracing::{debug, info, warn},
};

use crate::{
    Error, Result,
    error::panic_message,
    normalize::{SourceKey, link_spelling, normalize},
    store::RouteTableStore,
    table::RouteEntry,
};

/// An inbound chat message, reduced to what routing needs.
///
/// The payload stays with the platform and is addressed by
/// `(chat_id, message_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: i64,
    /// Public handle of the originating chat, without or with `@`.
    pub username: Option<String>,
    pub message_id: i32,
}

impl InboundEvent {
    pub fn new(chat_id: i64, username: Option<String>, message_id: i32) -> Self {
        Self {
            chat_id,
            username,
            message_id,
        }
    }

    /// Keys describing the originating chat, in lookup priority order:
    /// handle, numeric id, link-style spelling of the handle.
    pub fn candidate_keys(&self) -> Vec<SourceKey> {
        let handle = self
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let mut keys = Vec::with_capacity(3);
        if let Some(handle) = handle {
            keys.push(normalize(handle));
        }
        keys.push(normalize(&self.chat_id.to_string()));
        if let Some(handle) = handle {
            keys.push(SourceKey::from_raw(link_spelling(handle)));
        }

        let mut seen = Vec::with_capacity(keys.len());
        keys.retain(|key| {
            if key.is_empty() || seen.contains(key) {
                return false;
            }
            seen.push(key.clone());
            true
        });
        keys
    }
}

/// Delivers one inbound message to one destination.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, event: &InboundEvent, entry: &RouteEntry) -> anyhow::Result<()>;
}

/// Result of one forward attempt.
#[derive(Debug)]
pub struct ForwardOutcome {
    pub entry: RouteEntry,
    pub result: Result<()>,
}

/// What happened to one inbound event.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// The key that matched, if any.
    pub matched_key: Option<SourceKey>,
    pub outcomes: Vec<ForwardOutcome>,
}

impl DispatchReport {
    pub fn is_match(&self) -> bool {
        self.matched_key.is_some()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// Routes inbound events using the current table in a [`RouteTableStore`].
///
/// Stateless across events; safe to call concurrently.
pub struct Dispatcher {
    store: Arc<RouteTableStore>,
    forwarder: Arc<dyn Forwarder>,
}

impl Dispatcher {
    pub fn new(store: Arc<RouteTableStore>, forwarder: Arc<dyn Forwarder>) -> Self {
        Self { store, forwarder }
    }

    /// Forward `event` to every destination of the first matching key.
    ///
    /// Each destination is attempted once; a failure or panic in one attempt
    /// is recorded in its outcome and does not stop the others.
    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchReport {
        let table = self.store.snapshot();
        let candidates = event.candidate_keys();

        let Some((key, entries)) = candidates
            .into_iter()
            .find_map(|key| table.get(&key).map(|entries| (key, entries.to_vec())))
        else {
            return DispatchReport::default();
        };
        drop(table);

        info!(
            source = %key,
            chat_id = event.chat_id,
            message_id = event.message_id,
            destinations = entries.len(),
            "inbound message matched a route"
        );

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = self.forward_one(event, &entry).await;
            match &result {
                Ok(()) => debug!(source = %key, destination = %entry, "forwarded"),
                Err(e) => warn!(source = %key, destination = %entry, error = %e, "forward failed"),
            }
            outcomes.push(ForwardOutcome { entry, result });
        }

        DispatchReport {
            matched_key: Some(key),
            outcomes,
        }
    }

    async fn forward_one(&self, event: &InboundEvent, entry: &RouteEntry) -> Result<()> {
        let attempt = AssertUnwindSafe(self.forwarder.forward(event, entry)).catch_unwind();
        match attempt.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::forward(&entry.destination, format!("{e:#}"))),
            Err(panic) => Err(Error::forward(
                &entry.destination,
                format!("panicked: {}", panic_message(panic.as_ref())),
            )),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        super::*,
        crate::{
            sync::{
                DEFAULT_ACTIVE_STATUS, RouteSynchronizer, RowSource, SheetRow, build_route_table,
            },
            table::{ChatTarget, RouteTable, ThreadId},
        },
    };

    /// Records every attempt; fails or panics for configured destinations.
    #[derive(Default)]
    struct RecordingForwarder {
        attempts: Mutex<Vec<(i32, ChatTarget, Option<ThreadId>)>>,
        fail_for: Vec<ChatTarget>,
        panic_for: Vec<ChatTarget>,
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(&self, event: &InboundEvent, entry: &RouteEntry) -> anyhow::Result<()> {
            self.attempts.lock().unwrap().push((
                event.message_id,
                entry.destination.clone(),
                entry.thread,
            ));
            if self.panic_for.contains(&entry.destination) {
                panic!("forwarder blew up");
            }
            if self.fail_for.contains(&entry.destination) {
                anyhow::bail!("chat not found");
            }
            Ok(())
        }
    }

    fn table(rows: &[SheetRow]) -> RouteTable {
        build_route_table(rows, DEFAULT_ACTIVE_STATUS).0
    }

    fn dispatcher(
        table: RouteTable,
        forwarder: Arc<RecordingForwarder>,
    ) -> (Dispatcher, Arc<RouteTableStore>) {
        let store = Arc::new(RouteTableStore::with_table(table));
        (Dispatcher::new(Arc::clone(&store), forwarder), store)
    }

    fn news_event() -> InboundEvent {
        InboundEvent::new(-100777, Some("news_ch".into()), 10)
    }

    #[test]
    fn candidate_keys_in_priority_order() {
        let keys: Vec<String> = news_event()
            .candidate_keys()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(keys, ["@news_ch", "-100777", "t.me/news_ch"]);
    }

    #[test]
    fn candidate_keys_without_handle() {
        let event = InboundEvent::new(-42, None, 1);
        assert_eq!(event.candidate_keys(), vec![normalize("-42")]);
        let event = InboundEvent::new(-42, Some("  ".into()), 1);
        assert_eq!(event.candidate_keys(), vec![normalize("-42")]);
    }

    #[tokio::test]
    async fn matching_handle_forwards_to_thread() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, _) = dispatcher(
            table(&[SheetRow::new("news_ch", "-100123", "5", "Aktif")]),
            Arc::clone(&forwarder),
        );

        let report = dispatcher.dispatch(&news_event()).await;

        assert_eq!(report.matched_key, Some(normalize("news_ch")));
        assert_eq!(report.delivered(), 1);
        assert_eq!(*forwarder.attempts.lock().unwrap(), vec![(
            10,
            ChatTarget::Id(-100123),
            ThreadId::new(5)
        )]);
    }

    #[tokio::test]
    async fn inactive_row_produces_no_forward() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, _) = dispatcher(
            table(&[SheetRow::new(
                "https://t.me/news_ch",
                "-100123",
                "",
                "Nonaktif",
            )]),
            Arc::clone(&forwarder),
        );

        let report = dispatcher.dispatch(&news_event()).await;

        assert!(!report.is_match());
        assert!(forwarder.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmatched_event_is_dropped() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, _) = dispatcher(
            table(&[SheetRow::new("other", "-1", "", "Aktif")]),
            Arc::clone(&forwarder),
        );

        let report = dispatcher.dispatch(&news_event()).await;

        assert!(!report.is_match());
        assert!(report.outcomes.is_empty());
        assert!(forwarder.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn handle_route_wins_over_id_route() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, _) = dispatcher(
            table(&[
                SheetRow::new("-100777", "-2", "", "Aktif"),
                SheetRow::new("@news_ch", "-1", "", "Aktif"),
            ]),
            Arc::clone(&forwarder),
        );

        let report = dispatcher.dispatch(&news_event()).await;

        assert_eq!(report.matched_key, Some(normalize("news_ch")));
        let attempts = forwarder.attempts.lock().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].1, ChatTarget::Id(-1));
    }

    #[tokio::test]
    async fn id_route_matches_chat_without_handle() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, _) = dispatcher(
            table(&[SheetRow::new("-100777", "@mirror", "", "Aktif")]),
            Arc::clone(&forwarder),
        );

        let report = dispatcher
            .dispatch(&InboundEvent::new(-100777, None, 3))
            .await;

        assert_eq!(report.matched_key, Some(normalize("-100777")));
        assert_eq!(forwarder.attempts.lock().unwrap()[0].1, ChatTarget::Handle("@mirror".into()));
    }

    #[tokio::test]
    async fn failing_destination_does_not_block_siblings() {
        let forwarder = Arc::new(RecordingForwarder {
            fail_for: vec![ChatTarget::Id(-1)],
            panic_for: vec![ChatTarget::Id(-2)],
            ..Default::default()
        });
        let (dispatcher, _) = dispatcher(
            table(&[
                SheetRow::new("news_ch", "-1", "", "Aktif"),
                SheetRow::new("news_ch", "-2", "", "Aktif"),
                SheetRow::new("news_ch", "-3", "", "Aktif"),
            ]),
            Arc::clone(&forwarder),
        );

        let report = dispatcher.dispatch(&news_event()).await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 2);
        let err = report.outcomes[0].result.as_ref().unwrap_err().to_string();
        assert!(err.contains("chat not found"), "{err}");
        let err = report.outcomes[1].result.as_ref().unwrap_err().to_string();
        assert!(err.contains("panicked: forwarder blew up"), "{err}");
        assert!(report.outcomes[2].result.is_ok());

        let destinations: Vec<_> = forwarder
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, dest, _)| dest.clone())
            .collect();
        assert_eq!(destinations, vec![
            ChatTarget::Id(-1),
            ChatTarget::Id(-2),
            ChatTarget::Id(-3)
        ]);
    }

    #[tokio::test]
    async fn republished_table_takes_effect_for_next_event() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, store) = dispatcher(RouteTable::default(), Arc::clone(&forwarder));

        assert!(!dispatcher.dispatch(&news_event()).await.is_match());
        store.publish(table(&[SheetRow::new("news_ch", "-9", "", "Aktif")]));
        assert!(dispatcher.dispatch(&news_event()).await.is_match());
    }

    /// Serves one active route, then fails every later fetch.
    #[derive(Default)]
    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RowSource for FlakySource {
        async fn fetch_rows(&self) -> anyhow::Result<Vec<SheetRow>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec![SheetRow::new("news_ch", "-100123", "5", "Aktif")])
            } else {
                anyhow::bail!("sheet unreachable")
            }
        }
    }

    #[tokio::test]
    async fn routes_survive_a_failed_sync() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let (dispatcher, store) = dispatcher(RouteTable::default(), Arc::clone(&forwarder));
        let sync = RouteSynchronizer::new(Arc::new(FlakySource::default()), store);

        sync.sync_once().await.unwrap();
        assert!(sync.sync_once().await.is_err());

        let report = dispatcher.dispatch(&news_event()).await;
        assert_eq!(report.delivered(), 1);
        assert_eq!(*forwarder.attempts.lock().unwrap(), vec![(
            10,
            ChatTarget::Id(-100123),
            ThreadId::new(5)
        )]);
    }
}

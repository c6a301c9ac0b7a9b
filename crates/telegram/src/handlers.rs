use std::sync::Arc;

use {
    teloxide::types::{Message, Update, UpdateKind},
    tracing::{debug, info},
};

use courier_routing::{Dispatcher, InboundEvent};

/// Routing view of an update, or `None` for updates that never carry a
/// routable message (callbacks, edits, membership changes).
pub fn inbound_event(update: &Update) -> Option<InboundEvent> {
    match &update.kind {
        UpdateKind::Message(msg) | UpdateKind::ChannelPost(msg) => Some(event_from_message(msg)),
        _ => None,
    }
}

pub fn event_from_message(msg: &Message) -> InboundEvent {
    InboundEvent::new(
        msg.chat.id.0,
        msg.chat.username().map(str::to_string),
        msg.id.0,
    )
}

/// Route one inbound message through the dispatcher.
pub async fn handle_message(event: InboundEvent, dispatcher: Arc<Dispatcher>) {
    let report = dispatcher.dispatch(&event).await;
    match &report.matched_key {
        Some(key) => info!(
            source = %key,
            chat_id = event.chat_id,
            delivered = report.delivered(),
            failed = report.failed(),
            "telegram message relayed"
        ),
        None => debug!(
            chat_id = event.chat_id,
            username = ?event.username,
            "no route for telegram message"
        ),
    }
}

use {
    async_trait::async_trait,
    teloxide::{
        payloads::CopyMessageSetters,
        prelude::*,
        types::{ChatId, MessageId, Recipient, ThreadId as TopicId},
    },
    tracing::debug,
};

use courier_routing::{ChatTarget, Forwarder, InboundEvent, RouteEntry};

use crate::Error;

/// Copies inbound messages into their destination chats.
#[derive(Clone)]
pub struct TelegramForwarder {
    bot: Bot,
}

impl TelegramForwarder {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Forwarder for TelegramForwarder {
    async fn forward(&self, event: &InboundEvent, entry: &RouteEntry) -> anyhow::Result<()> {
        let mut request = self.bot.copy_message(
            recipient(&entry.destination),
            ChatId(event.chat_id),
            MessageId(event.message_id),
        );
        if let Some(thread) = entry.thread {
            request = request.message_thread_id(TopicId(MessageId(thread.get())));
        }

        let copied = request
            .await
            .map_err(|e| Error::copy(&entry.destination, e))?;
        debug!(
            from_chat = event.chat_id,
            message_id = event.message_id,
            destination = %entry,
            copied_id = copied.0,
            "telegram message copied"
        );
        Ok(())
    }
}

/// Bot API recipient for a route destination.
///
/// Handles are sent as `@name`; a bare name gains the marker.
pub fn recipient(target: &ChatTarget) -> Recipient {
    match target {
        ChatTarget::Id(id) => Recipient::Id(ChatId(*id)),
        ChatTarget::Handle(handle) => {
            let handle = handle.trim();
            if handle.starts_with('@') {
                Recipient::ChannelUsername(handle.to_string())
            } else {
                Recipient::ChannelUsername(format!("@{handle}"))
            }
        },
    }
}

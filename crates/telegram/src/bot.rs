use std::{sync::Arc, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, Update},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use courier_routing::Dispatcher;

use crate::{Error, Result, handlers};

/// Pause after a failed `getUpdates` call.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A verified bot session.
pub struct TelegramConnection {
    pub bot: Bot,
    pub username: Option<String>,
}

/// Build the bot client, verify the token, and clear any webhook so long
/// polling receives updates.
pub async fn connect(token: &Secret<String>, poll_timeout_secs: u32) -> Result<TelegramConnection> {
    verify(build_bot(token, poll_timeout_secs)?).await
}

fn build_bot(token: &Secret<String>, poll_timeout_secs: u32) -> Result<Bot> {
    // The HTTP timeout must outlive the long-poll timeout or every idle poll
    // would be reported as a failure.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(poll_timeout_secs) + 15))
        .build()
        .map_err(|e| Error::Client(e.to_string()))?;
    Ok(Bot::with_client(token.expose_secret(), client))
}

/// Check credentials with `getMe` and clear any webhook.
pub async fn verify(bot: Bot) -> Result<TelegramConnection> {
    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;

    let username = me.username.clone();
    info!(username = ?username, "telegram bot connected (webhook cleared)");
    Ok(TelegramConnection { bot, username })
}

/// Spawn the polling loop.
///
/// Every routable update is dispatched on its own task so slow forwards never
/// hold up the next poll. The loop exits when `cancel` fires, or when another
/// instance starts polling with the same token.
pub fn start_polling(
    bot: Bot,
    dispatcher: Arc<Dispatcher>,
    poll_timeout_secs: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            let request = bot
                .get_updates()
                .offset(offset)
                .timeout(poll_timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost]);

            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = request.send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        spawn_dispatch(&update, &dispatcher);
                    }
                },
                Err(e) => {
                    if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                        warn!("telegram polling stopped: another instance is running with this token");
                        cancel.cancel();
                        break;
                    }

                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                    }
                },
            }
        }

        info!("telegram polling stopped");
    })
}

fn spawn_dispatch(update: &Update, dispatcher: &Arc<Dispatcher>) {
    match handlers::inbound_event(update) {
        Some(event) => {
            debug!(
                chat_id = event.chat_id,
                message_id = event.message_id,
                "received telegram message"
            );
            tokio::spawn(handlers::handle_message(event, Arc::clone(dispatcher)));
        },
        None => debug!("ignoring non-message update: {:?}", update.kind),
    }
}

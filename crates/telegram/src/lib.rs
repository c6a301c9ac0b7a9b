//! Telegram transport for the courier relay.
//!
//! Receives updates through Bot API long polling, turns them into
//! [`courier_routing::InboundEvent`]s for the dispatcher, and forwards matched
//! messages with `copyMessage` so media and captions travel as one unit.
//!
//! The relay runs as a bot, so it only sees sources the bot belongs to:
//! groups where it is a member (with privacy mode off to read all messages)
//! and channels where it is an administrator.

pub mod bot;
pub mod error;
pub mod handlers;
pub mod outbound;

pub use {
    bot::{TelegramConnection, connect, start_polling, verify},
    error::{Error, Result},
    outbound::TelegramForwarder,
};

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_support;

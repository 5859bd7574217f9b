//! # Palaver Bot
//!
//! Telegram front end of Palaver. Polls the Bot API for updates, hands each
//! one to its own task, and answers through the command router or the
//! session coordinator.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod bot;
pub mod error;
pub mod telegram;

pub use bot::{PalaverBot, UpdateHandler};
pub use error::{BotError, BotResult};
pub use telegram::{split_message, TelegramGateway, Update, MAX_MESSAGE_CHARS};

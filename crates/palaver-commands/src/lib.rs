//! # Palaver Commands
//!
//! Slash commands that inspect and change per-chat settings and memory,
//! generate images and start broadcasts. The router is independent of the
//! messaging platform: it takes an [`palaver_engine::IncomingMessage`] and
//! returns a [`CommandReply`] for the caller to deliver.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod cooldown;
pub mod router;

pub use command::{Command, ParsedCommand, DRAW_KEYWORD};
pub use cooldown::{CooldownError, CooldownManager};
pub use router::{CommandReply, CommandRouter, RouterOptions, RouterServices, DEFAULT_DRAW_COOLDOWN};

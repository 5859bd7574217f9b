//! # Palaver Engine
//!
//! The conversational core: turns an incoming message into a prompt, asks
//! the inference service for a reply and records the exchange, and fans
//! administrative announcements out to every user.
//!
//! External systems are reached through the [`InferenceService`] and
//! [`MessagingGateway`] traits; [`GeminiClient`] implements the former.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod broadcast;
pub mod coordinator;
pub mod gateway;
pub mod gemini;
pub mod inference;
pub mod prompt;
pub mod usage;

pub use broadcast::{
    BroadcastCategory, BroadcastDispatcher, BroadcastProgress, BroadcastReport, BroadcastRequest,
};
pub use coordinator::{Outcome, SessionCoordinator};
pub use gateway::{IncomingMessage, MessagingGateway, ReplyContext};
pub use gemini::GeminiClient;
pub use inference::{GenerationRequest, InferenceService};
pub use prompt::PromptComposer;
pub use usage::{UsageStats, UsageTracker};

#[cfg(any(test, feature = "testing"))]
pub use gateway::MockMessagingGateway;
#[cfg(any(test, feature = "testing"))]
pub use inference::MockInferenceService;

//! Administrative broadcast fan-out.
//!
//! Recipients are every user with a durable settings record. Delivery is
//! sequential with a fixed pause between sends; failures are counted and
//! logged, never retried. Every recipient ends up in exactly one of
//! `delivered`, `failed` or `skipped`.

use crate::gateway::MessagingGateway;
use chrono::Utc;
use palaver_common::{format_timestamp, ChatId, Result};
use palaver_config::BroadcastConfig;
use palaver_i18n::{fluent_args, Locale, Messages};
use palaver_store::{SettingsRecord, SettingsStore};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Kind of announcement, which decides who may opt out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BroadcastCategory {
    /// Regular announcement; skipped for users with `disable_broadcasts`.
    #[default]
    Normal,
    /// Always delivered.
    Important,
    /// Maintenance notice; skipped for users with
    /// `disable_tech_notifications`.
    Maintenance,
}

impl BroadcastCategory {
    /// Recognises a leading category tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "#important" | "#важно" => Some(Self::Important),
            "#maintenance" | "#тех_работы" => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// Whether a recipient with `settings` opted out of this category.
    pub const fn is_opted_out(self, settings: &SettingsRecord) -> bool {
        match self {
            Self::Normal => settings.disable_broadcasts,
            Self::Important => false,
            Self::Maintenance => settings.disable_tech_notifications,
        }
    }

    /// Message id of the localised header.
    pub const fn header_id(self) -> &'static str {
        match self {
            Self::Normal => "broadcast-header-normal",
            Self::Important => "broadcast-header-important",
            Self::Maintenance => "broadcast-header-maintenance",
        }
    }
}

impl fmt::Display for BroadcastCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Important => "important",
            Self::Maintenance => "maintenance",
        })
    }
}

/// A parsed `/broadcast` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRequest {
    /// Announcement text.
    pub body: String,
    /// Category.
    pub category: BroadcastCategory,
    /// Name shown in the signature.
    pub sender: String,
}

impl BroadcastRequest {
    /// Splits an optional leading tag from the body. Returns `None` when no
    /// body is left.
    pub fn parse(text: &str, sender: impl Into<String>) -> Option<Self> {
        let text = text.trim();
        let (category, body) = match text.split_once(char::is_whitespace) {
            Some((first, rest)) => match BroadcastCategory::from_tag(first) {
                Some(category) => (category, rest.trim()),
                None => (BroadcastCategory::Normal, text),
            },
            None => match BroadcastCategory::from_tag(text) {
                Some(category) => (category, ""),
                None => (BroadcastCategory::Normal, text),
            },
        };
        if body.is_empty() {
            return None;
        }
        Some(Self {
            body: body.to_string(),
            category,
            sender: sender.into(),
        })
    }
}

/// Periodic progress of a running broadcast, emitted every
/// `progress_every` successful deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastProgress {
    /// Successful deliveries so far.
    pub delivered: usize,
    /// Rejected deliveries so far.
    pub failed: usize,
    /// Opted-out recipients so far.
    pub skipped: usize,
    /// Recipients in total.
    pub total: usize,
}

impl BroadcastProgress {
    /// Recipients not processed yet.
    pub const fn remaining(&self) -> usize {
        self.total.saturating_sub(self.delivered + self.failed + self.skipped)
    }
}

/// Final accounting of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Successful deliveries.
    pub delivered: usize,
    /// Deliveries the gateway rejected.
    pub failed: usize,
    /// Recipients that opted out.
    pub skipped: usize,
    /// Recipients enumerated.
    pub total: usize,
    /// Category broadcast.
    pub category: BroadcastCategory,
    /// Wall time spent.
    pub duration: Duration,
}

impl BroadcastReport {
    /// Whether every recipient is accounted for exactly once.
    pub const fn is_balanced(&self) -> bool {
        self.delivered + self.failed + self.skipped == self.total
    }
}

/// Sends announcements to every known user.
pub struct BroadcastDispatcher {
    settings: SettingsStore,
    gateway: Arc<dyn MessagingGateway>,
    messages: Arc<Messages>,
    delay: Duration,
    progress_every: usize,
}

impl fmt::Debug for BroadcastDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastDispatcher")
            .field("delay", &self.delay)
            .field("progress_every", &self.progress_every)
            .finish_non_exhaustive()
    }
}

impl BroadcastDispatcher {
    /// Creates a dispatcher.
    pub fn new(
        settings: SettingsStore,
        gateway: Arc<dyn MessagingGateway>,
        messages: Arc<Messages>,
        config: &BroadcastConfig,
    ) -> Self {
        Self {
            settings,
            gateway,
            messages,
            delay: Duration::from_millis(config.delay_ms),
            progress_every: config.progress_every.max(1),
        }
    }

    /// Localised announcement text as a recipient sees it.
    pub fn render(&self, request: &BroadcastRequest, locale: Locale, timestamp: &str) -> String {
        let header = self.messages.get(locale, request.category.header_id(), None);
        let args = fluent_args![
            "sender" => request.sender.as_str(),
            "timestamp" => timestamp,
        ];
        let signature = self.messages.get(locale, "broadcast-signature", args.as_ref());
        format!("{header}\n\n{}\n\n{signature}", request.body)
    }

    /// Runs the broadcast to completion. Fails only when recipients cannot
    /// be enumerated.
    #[instrument(skip_all, fields(category = %request.category))]
    pub async fn run(
        &self,
        request: &BroadcastRequest,
        progress: Option<mpsc::Sender<BroadcastProgress>>,
    ) -> Result<BroadcastReport> {
        let started = Instant::now();
        let recipients = self.settings.list_users().await?;
        let total = recipients.len();
        let timestamp = format_timestamp(Utc::now());
        info!(total, "Broadcast started");

        let mut report = BroadcastReport {
            delivered: 0,
            failed: 0,
            skipped: 0,
            total,
            category: request.category,
            duration: Duration::ZERO,
        };

        for (user, settings) in &recipients {
            if request.category.is_opted_out(settings) {
                report.skipped += 1;
                continue;
            }

            let locale = self.messages.locale_for(&settings.language);
            let text = self.render(request, locale, &timestamp);
            let sent = self.gateway.send_text(ChatId::from(*user), &text).await;
            match &sent {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(%user, error = %err, "Broadcast delivery failed");
                }
            }

            let update = BroadcastProgress {
                delivered: report.delivered,
                failed: report.failed,
                skipped: report.skipped,
                total,
            };
            // The final report covers the last recipient.
            if sent.is_ok() && report.delivered % self.progress_every == 0 && update.remaining() > 0 {
                if let Some(progress) = &progress {
                    // A dropped receiver only means nobody is watching.
                    let _ = progress.send(update).await;
                }
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        report.duration = started.elapsed();
        info!(
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            total = report.total,
            "Broadcast finished"
        );
        Ok(report)
    }

    /// Runs the broadcast on its own task.
    pub fn spawn(
        self: Arc<Self>,
        request: BroadcastRequest,
        progress: Option<mpsc::Sender<BroadcastProgress>>,
    ) -> JoinHandle<Result<BroadcastReport>> {
        tokio::spawn(async move { self.run(&request, progress).await })
    }

    /// Localised summary of a finished broadcast.
    pub fn summarize(&self, report: &BroadcastReport, locale: Locale) -> String {
        let args = fluent_args![
            "delivered" => report.delivered,
            "failed" => report.failed,
            "skipped" => report.skipped,
            "total" => report.total,
            "seconds" => report.duration.as_secs(),
        ];
        self.messages.get(locale, "broadcast-report", args.as_ref())
    }

    /// Localised progress line.
    pub fn describe_progress(&self, progress: BroadcastProgress, locale: Locale) -> String {
        let args = fluent_args![
            "delivered" => progress.delivered,
            "failed" => progress.failed,
            "skipped" => progress.skipped,
            "remaining" => progress.remaining(),
            "total" => progress.total,
        ];
        self.messages.get(locale, "broadcast-progress", args.as_ref())
    }
}

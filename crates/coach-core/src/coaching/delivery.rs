//! Batch delivery of due messages.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coaching::stats::EngineStats;
use crate::config::DeliveryConfig;
use crate::error::CoachResult;
use crate::traits::{ActivitySource, CoachStore, Notification, Notifier};
use crate::types::{CoachingMessage, MessageQuery, MessageSort, MessageStatus, PersonalizationProfile};

/// Totals of one delivery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub due: usize,
    pub batches: usize,
    pub sent: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub expired: usize,
    /// Claimed by a concurrent sweep first.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Failed,
    Cancelled,
    Expired,
    Skipped,
}

/// Polls due messages and hands them to the notifier.
pub struct BatchDeliveryEngine {
    store: Arc<dyn CoachStore>,
    source: Arc<dyn ActivitySource>,
    notifier: Arc<dyn Notifier>,
    config: DeliveryConfig,
    stats: Arc<EngineStats>,
}

impl BatchDeliveryEngine {
    pub fn new(
        store: Arc<dyn CoachStore>,
        source: Arc<dyn ActivitySource>,
        notifier: Arc<dyn Notifier>,
        config: DeliveryConfig,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            config,
            stats,
        }
    }

    /// Deliver everything due at `now`, then expire what is left overdue.
    pub async fn run(&self, now: DateTime<Utc>) -> CoachResult<DeliveryReport> {
        let due = self.store.find_messages(
            &MessageQuery::new()
                .with_statuses(MessageStatus::queued())
                .scheduled_at_or_before(now)
                .not_expired_at(now),
            MessageSort::DeliveryOrder,
            usize::MAX,
            0,
        )?;

        let mut report = DeliveryReport {
            due: due.len(),
            ..Default::default()
        };

        for (i, batch) in due.chunks(self.config.batch_size.max(1)).enumerate() {
            if i > 0 && self.config.batch_pause_ms > 0 {
                tokio::time::sleep(StdDuration::from_millis(self.config.batch_pause_ms)).await;
            }
            report.batches += 1;
            let outcomes = join_all(batch.iter().map(|m| self.deliver_one(m.clone(), now))).await;
            for outcome in outcomes {
                match outcome {
                    Outcome::Sent => report.sent += 1,
                    Outcome::Failed => report.failed += 1,
                    Outcome::Cancelled => report.cancelled += 1,
                    Outcome::Expired => report.expired += 1,
                    Outcome::Skipped => report.skipped += 1,
                }
            }
            debug!(batch = i, size = batch.len(), "Delivery batch complete");
        }

        let swept = self.store.expire_overdue(now)?;
        report.expired += swept;

        self.stats.add_messages_sent(report.sent as u64);
        self.stats.add_delivery_errors(report.failed as u64);
        self.stats.add_messages_cancelled(report.cancelled as u64);
        self.stats.add_messages_expired(report.expired as u64);

        info!(
            due = report.due,
            sent = report.sent,
            failed = report.failed,
            cancelled = report.cancelled,
            expired = report.expired,
            skipped = report.skipped,
            "Delivery sweep complete"
        );
        Ok(report)
    }

    async fn deliver_one(&self, message: CoachingMessage, now: DateTime<Utc>) -> Outcome {
        let message_id = message.id;
        match self.try_deliver(message, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Delivery failed");
                Outcome::Failed
            }
        }
    }

    async fn try_deliver(&self, mut message: CoachingMessage, now: DateTime<Utc>) -> CoachResult<Outcome> {
        if message.is_expired_at(now) {
            message.transition(MessageStatus::Expired, now)?;
            self.store.update_message(&message)?;
            return Ok(Outcome::Expired);
        }

        let user = self.source.get_user(&message.user_id)?;
        if !user.is_some_and(|u| u.is_active) {
            message.transition(MessageStatus::Cancelled, now)?;
            self.store.update_message(&message)?;
            info!(message_id = %message.id, user_id = %message.user_id, "Cancelled message for missing user");
            return Ok(Outcome::Cancelled);
        }

        let prior = message.status;
        if !self.store.claim_for_delivery(message.id, now)? {
            debug!(message_id = %message.id, "Message already claimed");
            return Ok(Outcome::Skipped);
        }

        let notification = Notification::from(&message);
        if let Err(e) = self.notifier.deliver(&notification).await {
            self.store.release_claim(message.id, prior, now)?;
            warn!(
                message_id = %message.id,
                user_id = %message.user_id,
                error = %e,
                "Transport failed, message stays queued"
            );
            return Ok(Outcome::Failed);
        }

        let mut profile = self
            .store
            .get_profile(&message.user_id)?
            .unwrap_or_else(|| PersonalizationProfile::new(message.user_id.clone()));
        profile.record_sent(now);
        self.store.upsert_profile(&profile)?;

        if let Some(template_id) = message.template_id {
            if let Err(e) = self.store.bump_template_counters(template_id, 1, 0) {
                warn!(template_id = %template_id, error = %e, "Failed to update template usage");
            }
        }
        debug!(message_id = %message.id, user_id = %message.user_id, "Message delivered");
        Ok(Outcome::Sent)
    }
}

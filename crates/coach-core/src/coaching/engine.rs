//! The coaching engine: generation, delivery, interactions and maintenance.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coaching::catalog::default_templates;
use crate::coaching::composer::{ComposeContext, MessageComposer};
use crate::coaching::delivery::{BatchDeliveryEngine, DeliveryReport};
use crate::coaching::delivery_time::DeliveryScheduler;
use crate::coaching::governor::{CycleState, FrequencyGovernor, GovernorDecision};
use crate::coaching::stats::{EngineStats, StatsSnapshot, TaskRun};
use crate::coaching::triggers::{AnalysisInput, BehavioralTrigger, TriggerAnalyzer};
use crate::config::CoachConfig;
use crate::error::{CoachError, CoachResult};
use crate::traits::{ActivitySource, AnalyticsRollup, CoachStore, Notifier, Predictor};
use crate::types::{
    ActivityRecord, CoachingMessage, FrequencyTier, InteractionType, MessageQuery, MessageSort,
    MessageStatus, MessageType, Page, PersonalizationProfile, PredictionBundle, ProfileUpdate,
    TemplateQuery, UserRecord,
};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Result of one user's generation cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationOutcome {
    pub user_id: String,
    pub triggers: Vec<String>,
    pub messages: Vec<CoachingMessage>,
    /// Human-readable reasons for governed or failed drafts.
    pub rejections: Vec<String>,
    /// Set when analysis failed and the cycle ran with no triggers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

/// Totals of a generation sweep over all active users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub users: usize,
    pub batches: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub drafts: usize,
}

/// Filters for listing a user's messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListMessages {
    pub status: Option<MessageStatus>,
    pub message_type: Option<MessageType>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Per-user engagement summary.
#[derive(Debug, Clone, Serialize)]
pub struct UserInsights {
    pub user_id: String,
    pub frequency: FrequencyTier,
    pub total_sent: u64,
    pub total_engaged: u64,
    pub engagement_rate: f64,
    pub engagement_scores: BTreeMap<MessageType, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_type: Option<MessageType>,
    pub status_breakdown: BTreeMap<MessageStatus, usize>,
    pub upcoming: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_sent: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Point-in-time view of queue state and cycle counters.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub queue_depth: usize,
    pub stuck_pending: usize,
    pub stats: StatsSnapshot,
    pub task_runs: Vec<TaskRun>,
    pub checked_at: DateTime<Utc>,
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub ordinary: usize,
    pub acted_on: usize,
}

/// Entry point for everything the HTTP layer and the orchestrator call.
pub struct CoachingEngine {
    config: CoachConfig,
    store: Arc<dyn CoachStore>,
    source: Arc<dyn ActivitySource>,
    predictor: Arc<dyn Predictor>,
    analyzer: TriggerAnalyzer,
    delivery: BatchDeliveryEngine,
    stats: Arc<EngineStats>,
}

impl CoachingEngine {
    pub fn new(
        config: CoachConfig,
        store: Arc<dyn CoachStore>,
        source: Arc<dyn ActivitySource>,
        predictor: Arc<dyn Predictor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let stats = Arc::new(EngineStats::new());
        let delivery = BatchDeliveryEngine::new(
            store.clone(),
            source.clone(),
            notifier,
            config.delivery.clone(),
            stats.clone(),
        );
        Self {
            config,
            store,
            source,
            predictor,
            analyzer: TriggerAnalyzer::new(),
            delivery,
            stats,
        }
    }

    pub fn config(&self) -> &CoachConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Insert the built-in templates if the store has none.
    pub fn seed_default_templates(&self) -> CoachResult<usize> {
        if self.store.count_templates()? > 0 {
            debug!("Templates already present, skipping seed");
            return Ok(0);
        }
        let templates = default_templates()?;
        for template in &templates {
            self.store.insert_template(template)?;
        }
        info!(count = templates.len(), "Seeded default templates");
        Ok(templates.len())
    }

    // ------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------

    pub async fn generate_for_user(&self, user_id: &str) -> CoachResult<GenerationOutcome> {
        self.generate_for_user_at(user_id, Utc::now()).await
    }

    pub async fn generate_for_user_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> CoachResult<GenerationOutcome> {
        let user = self
            .source
            .get_user(user_id)?
            .filter(|u| u.is_active)
            .ok_or_else(|| CoachError::user_not_found(user_id))?;
        self.generate_for(&user, now).await
    }

    /// Run one generation cycle for `user`.
    async fn generate_for(&self, user: &UserRecord, now: DateTime<Utc>) -> CoachResult<GenerationOutcome> {
        let profile = self
            .store
            .get_profile(&user.id)?
            .unwrap_or_else(|| PersonalizationProfile::new(user.id.clone()));
        let mut outcome = GenerationOutcome {
            user_id: user.id.clone(),
            ..Default::default()
        };

        let (activities, predictions, triggers) = match self.analyze(user, &profile, now).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Analysis failed, continuing with no triggers");
                self.stats.add_analysis_errors(1);
                self.stats.add_users_processed(1);
                outcome.analysis_error = Some(e.to_string());
                return Ok(outcome);
            }
        };
        outcome.triggers = triggers.iter().map(|t| t.tag().to_string()).collect();

        let templates = self.store.find_templates(&TemplateQuery::all_active())?;
        let governor = FrequencyGovernor::new(&self.config.governor, self.store.as_ref(), &templates);
        let composer = MessageComposer::new(&templates, self.config.generation.fallback_expiry_hours);
        let ctx = ComposeContext {
            user,
            profile: &profile,
            predictions: &predictions,
            activity_count: activities.len(),
            now,
        };

        let mut cycle = CycleState::default();
        let mut drafts = Vec::new();
        for trigger in &triggers {
            let types = match governor.evaluate(trigger, &profile, &cycle, now)? {
                GovernorDecision::Rejected(reasons) => {
                    self.stats.add_governor_rejections(1);
                    debug!(user_id = %user.id, trigger = trigger.tag(), reasons = ?reasons, "Trigger rejected");
                    outcome
                        .rejections
                        .extend(reasons.iter().map(|r| format!("{}: {}", trigger.tag(), r)));
                    continue;
                }
                GovernorDecision::Approved { types, skipped } => {
                    outcome
                        .rejections
                        .extend(skipped.iter().map(|r| format!("{}: {}", trigger.tag(), r)));
                    types
                }
            };

            for message_type in types {
                match composer.compose(trigger, message_type, &ctx) {
                    Ok(draft) => {
                        cycle.record(message_type);
                        drafts.push(draft);
                    }
                    Err(e) => {
                        self.stats.add_composition_errors(1);
                        warn!(
                            user_id = %user.id,
                            trigger = trigger.tag(),
                            message_type = %message_type,
                            error = %e,
                            "Composition failed"
                        );
                        outcome
                            .rejections
                            .push(format!("{}: {} not composed: {}", trigger.tag(), message_type, e));
                    }
                }
            }
        }

        if !drafts.is_empty() {
            let occupied = self
                .store
                .find_messages(
                    &MessageQuery::for_user(&user.id)
                        .with_statuses(MessageStatus::queued())
                        .scheduled_after(now),
                    MessageSort::ScheduledAsc,
                    usize::MAX,
                    0,
                )?
                .into_iter()
                .map(|m| m.scheduled_for)
                .collect();
            DeliveryScheduler::new(&self.config.delivery).schedule(&mut drafts, &profile, occupied, now)?;
            for draft in &drafts {
                self.store.insert_message(draft)?;
            }
        }

        self.stats.add_drafts_created(drafts.len() as u64);
        self.stats.add_users_processed(1);
        info!(
            user_id = %user.id,
            triggers = outcome.triggers.len(),
            drafts = drafts.len(),
            "Generation cycle complete"
        );
        outcome.messages = drafts;
        Ok(outcome)
    }

    async fn analyze(
        &self,
        user: &UserRecord,
        profile: &PersonalizationProfile,
        now: DateTime<Utc>,
    ) -> CoachResult<(Vec<ActivityRecord>, PredictionBundle, Vec<BehavioralTrigger>)> {
        let since = now - Duration::days(self.config.generation.history_window_days);
        let activities = self.source.recent_activities(&user.id, since)?;
        let values = self.source.values_for_user(&user.id)?;
        let predictions = self
            .predictor
            .predict(user, &activities, &values)
            .await?
            .sanitized();
        let triggers = self.analyzer.analyze(&AnalysisInput {
            activities: &activities,
            values: &values,
            predictions: &predictions,
            now,
            tz: profile.tz(),
        });
        Ok((activities, predictions, triggers))
    }

    pub async fn generate_sweep(&self) -> CoachResult<GenerationReport> {
        self.generate_sweep_at(Utc::now()).await
    }

    /// Generate for every active user in bounded, concurrent batches.
    pub async fn generate_sweep_at(&self, now: DateTime<Utc>) -> CoachResult<GenerationReport> {
        let cfg = &self.config.generation;
        let semaphore = Semaphore::new(cfg.concurrency.max(1));
        let mut report = GenerationReport::default();
        let mut offset = 0;

        loop {
            let users = self.source.list_active_users(cfg.batch_size.max(1), offset)?;
            if users.is_empty() {
                break;
            }
            if report.batches > 0 && cfg.batch_pause_ms > 0 {
                tokio::time::sleep(StdDuration::from_millis(cfg.batch_pause_ms)).await;
            }
            offset += users.len();
            report.batches += 1;
            report.users += users.len();

            let results = join_all(users.iter().map(|user| {
                let semaphore = &semaphore;
                async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|e| CoachError::internal(e.to_string()))?;
                    self.generate_for(user, now).await
                }
            }))
            .await;

            for (user, result) in users.iter().zip(results) {
                match result {
                    Ok(outcome) => {
                        report.succeeded += 1;
                        report.drafts += outcome.messages.len();
                    }
                    Err(e) => {
                        report.failed += 1;
                        self.stats.add_generation_errors(1);
                        warn!(user_id = %user.id, error = %e, "Generation failed for user");
                    }
                }
            }
        }

        info!(
            users = report.users,
            batches = report.batches,
            failed = report.failed,
            drafts = report.drafts,
            "Generation sweep complete"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    pub async fn deliver_due(&self) -> CoachResult<DeliveryReport> {
        self.deliver_due_at(Utc::now()).await
    }

    pub async fn deliver_due_at(&self, now: DateTime<Utc>) -> CoachResult<DeliveryReport> {
        self.delivery.run(now).await
    }

    // ------------------------------------------------------------------
    // User-facing operations
    // ------------------------------------------------------------------

    /// A page of the user's messages, newest first.
    pub fn list_messages(&self, user_id: &str, request: &ListMessages) -> CoachResult<Page<CoachingMessage>> {
        let limit = request.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(CoachError::out_of_range(
                "limit",
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        let mut query = MessageQuery::for_user(user_id);
        if let Some(status) = request.status {
            query = query.with_statuses([status]);
        }
        if let Some(message_type) = request.message_type {
            query = query.with_type(message_type);
        }
        let total = self.store.count_messages(&query)?;
        let items = self
            .store
            .find_messages(&query, MessageSort::NewestFirst, limit, request.offset)?;
        Ok(Page {
            items,
            total,
            limit,
            offset: request.offset,
        })
    }

    pub fn record_interaction(&self, message_id: Uuid, interaction: InteractionType) -> CoachResult<CoachingMessage> {
        self.record_interaction_at(message_id, interaction, Utc::now())
    }

    /// Apply a user interaction to a delivered message and learn from it.
    pub fn record_interaction_at(
        &self,
        message_id: Uuid,
        interaction: InteractionType,
        now: DateTime<Utc>,
    ) -> CoachResult<CoachingMessage> {
        let mut message = self
            .store
            .get_message(message_id)?
            .ok_or_else(|| CoachError::message_not_found(message_id.to_string()))?;
        let prior = message.status;

        match interaction {
            InteractionType::Snoozed { minutes } => {
                let minutes = minutes.unwrap_or(self.config.delivery.default_snooze_minutes);
                message.snooze(minutes, now)?;
            }
            _ => message.transition(interaction.target_status(), now)?,
        }
        self.store.update_message(&message)?;

        if let Some(signal) = interaction.engagement_signal() {
            let mut profile = self
                .store
                .get_profile(&message.user_id)?
                .unwrap_or_else(|| PersonalizationProfile::new(message.user_id.clone()));
            profile.record_engagement(message.message_type, signal, now);
            self.store.upsert_profile(&profile)?;
        }

        // First engagement with a delivered message counts once per template.
        let engaged = matches!(interaction, InteractionType::Read | InteractionType::ActedOn);
        if let (Some(template_id), true) = (message.template_id, engaged && prior == MessageStatus::Sent) {
            self.store.bump_template_counters(template_id, 0, 1)?;
        }

        self.stats.add_interactions(1);
        info!(
            message_id = %message.id,
            user_id = %message.user_id,
            interaction = ?interaction,
            status = %message.status,
            "Recorded interaction"
        );
        Ok(message)
    }

    pub fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> CoachResult<PersonalizationProfile> {
        self.update_profile_at(user_id, update, Utc::now())
    }

    pub fn update_profile_at(
        &self,
        user_id: &str,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> CoachResult<PersonalizationProfile> {
        if self.source.get_user(user_id)?.is_none() {
            return Err(CoachError::user_not_found(user_id));
        }
        let mut profile = self
            .store
            .get_profile(user_id)?
            .unwrap_or_else(|| PersonalizationProfile::new(user_id));
        update.apply(&mut profile, now)?;
        self.store.upsert_profile(&profile)?;
        info!(user_id, "Updated personalization profile");
        Ok(profile)
    }

    pub fn insights(&self, user_id: &str) -> CoachResult<UserInsights> {
        self.insights_at(user_id, Utc::now())
    }

    pub fn insights_at(&self, user_id: &str, now: DateTime<Utc>) -> CoachResult<UserInsights> {
        if self.source.get_user(user_id)?.is_none() {
            return Err(CoachError::user_not_found(user_id));
        }
        let profile = self
            .store
            .get_profile(user_id)?
            .unwrap_or_else(|| PersonalizationProfile::new(user_id));

        let mut status_breakdown = BTreeMap::new();
        for status in MessageStatus::iter() {
            let count = self
                .store
                .count_messages(&MessageQuery::for_user(user_id).with_statuses([status]))?;
            if count > 0 {
                status_breakdown.insert(status, count);
            }
        }
        let upcoming = self.store.count_messages(
            &MessageQuery::for_user(user_id)
                .with_statuses(MessageStatus::queued())
                .scheduled_after(now),
        )?;

        let engagement_scores: BTreeMap<MessageType, f64> =
            profile.engagement_scores.iter().map(|(k, v)| (*k, *v)).collect();
        let best_type = engagement_scores
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(k, _)| *k);

        Ok(UserInsights {
            user_id: user_id.to_string(),
            frequency: profile.frequency,
            total_sent: profile.total_sent,
            total_engaged: profile.total_engaged,
            engagement_rate: profile.engagement_rate(),
            engagement_scores,
            best_type,
            status_breakdown,
            upcoming,
            last_message_sent: profile.last_message_sent,
        })
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    pub fn system_health(&self) -> CoachResult<HealthSnapshot> {
        self.system_health_at(Utc::now())
    }

    pub fn system_health_at(&self, now: DateTime<Utc>) -> CoachResult<HealthSnapshot> {
        let health = &self.config.health;
        let queue_depth = self
            .store
            .count_messages(&MessageQuery::new().with_statuses(MessageStatus::queued()))?;
        let stuck_pending = self.store.count_messages(
            &MessageQuery::new()
                .with_statuses([MessageStatus::Pending])
                .created_before(now - Duration::hours(health.stuck_pending_hours)),
        )?;

        let status = if queue_depth >= health.queue_critical {
            HealthStatus::Critical
        } else if queue_depth >= health.queue_warning || stuck_pending > 0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        Ok(HealthSnapshot {
            status,
            queue_depth,
            stuck_pending,
            stats: self.stats.snapshot(),
            task_runs: self.stats.task_runs(),
            checked_at: now,
        })
    }

    /// Snapshot health and log anything that needs attention.
    pub fn health_check_at(&self, now: DateTime<Utc>) -> CoachResult<HealthSnapshot> {
        let snapshot = self.system_health_at(now)?;
        match snapshot.status {
            HealthStatus::Healthy => debug!(queue_depth = snapshot.queue_depth, "Health check passed"),
            status => warn!(
                status = ?status,
                queue_depth = snapshot.queue_depth,
                stuck_pending = snapshot.stuck_pending,
                "Health check degraded"
            ),
        }
        Ok(snapshot)
    }

    /// Roll up the previous UTC day's messages per type.
    pub fn analytics_rollup_at(&self, now: DateTime<Utc>) -> CoachResult<Vec<AnalyticsRollup>> {
        let day = (now - Duration::days(1)).date_naive();
        let start = day.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1);

        let mut rollups = Vec::new();
        for message_type in MessageType::iter() {
            let base = MessageQuery::new()
                .with_type(message_type)
                .created_since(start)
                .created_before(end);
            let count = |statuses: &[MessageStatus]| -> CoachResult<u64> {
                let query = base.clone().with_statuses(statuses.iter().copied());
                Ok(self.store.count_messages(&query)? as u64)
            };
            let created = count(&[])?;
            if created == 0 {
                continue;
            }
            let rollup = AnalyticsRollup {
                day,
                message_type: message_type.to_string(),
                created,
                sent: count(&[MessageStatus::Sent, MessageStatus::Read, MessageStatus::ActedOn])?,
                read: count(&[MessageStatus::Read, MessageStatus::ActedOn])?,
                acted_on: count(&[MessageStatus::ActedOn])?,
                expired: count(&[MessageStatus::Expired])?,
                cancelled: count(&[MessageStatus::Cancelled])?,
                computed_at: now,
            };
            self.store.save_rollup(&rollup)?;
            rollups.push(rollup);
        }
        info!(day = %day, types = rollups.len(), "Analytics rollup complete");
        Ok(rollups)
    }

    /// Delete old messages: ordinary ones after the short window, acted-on
    /// ones after the long one.
    pub fn retention_cleanup_at(&self, now: DateTime<Utc>) -> CoachResult<RetentionReport> {
        let retention = &self.config.retention;
        let ordinary_statuses: Vec<_> = MessageStatus::iter()
            .filter(|s| *s != MessageStatus::ActedOn)
            .collect();
        let ordinary = self.store.delete_messages(
            &MessageQuery::new()
                .with_statuses(ordinary_statuses)
                .created_before(now - Duration::days(retention.message_days)),
        )?;
        let acted_on = self.store.delete_messages(
            &MessageQuery::new()
                .with_statuses([MessageStatus::ActedOn])
                .created_before(now - Duration::days(retention.acted_on_days)),
        )?;
        info!(ordinary, acted_on, "Retention cleanup complete");
        Ok(RetentionReport { ordinary, acted_on })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteCoachStore;
    use crate::traits::{MockNotifier, MockPredictor};
    use crate::types::{MessagePriority, RiskLevel, StreakRisk};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        // Wednesday, 12:00 UTC.
        Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap()
    }

    fn high_risk() -> PredictionBundle {
        PredictionBundle {
            streak_risk: StreakRisk {
                risk_level: RiskLevel::High,
                risk_score: 0.9,
                current_streak: 12,
                hours_since_last_activity: 22.0,
            },
            ..Default::default()
        }
    }

    fn engine_with(predictor: MockPredictor) -> (CoachingEngine, Arc<SqliteCoachStore>) {
        let store = Arc::new(SqliteCoachStore::in_memory().unwrap());
        store
            .insert_user(&UserRecord::new("u1", "Ada Lovelace", now() - Duration::days(30)))
            .unwrap();
        let mut notifier = MockNotifier::new();
        notifier.expect_deliver().returning(|_| Ok(()));
        let engine = CoachingEngine::new(
            CoachConfig::default(),
            store.clone(),
            store.clone(),
            Arc::new(predictor),
            Arc::new(notifier),
        );
        (engine, store)
    }

    fn predicting(bundle: PredictionBundle) -> MockPredictor {
        let mut predictor = MockPredictor::new();
        predictor
            .expect_predict()
            .returning(move |_, _, _| Ok(bundle.clone()));
        predictor
    }

    #[tokio::test]
    async fn test_streak_risk_generates_urgent_warning() {
        let (engine, store) = engine_with(predicting(high_risk()));
        engine.seed_default_templates().unwrap();

        let outcome = engine.generate_for_user_at("u1", now()).await.unwrap();
        assert!(outcome.triggers.contains(&"streak_risk".to_string()));
        let warning = outcome
            .messages
            .iter()
            .find(|m| m.message_type == MessageType::StreakRiskWarning)
            .unwrap();
        assert_eq!(warning.priority, MessagePriority::Urgent);
        assert_eq!(warning.status, MessageStatus::Scheduled);
        assert!(warning.template_id.is_some());
        assert!(warning.title.contains("12"));

        let stored = store.get_message(warning.id).unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_predictor_failure_yields_no_triggers() {
        let mut predictor = MockPredictor::new();
        predictor
            .expect_predict()
            .returning(|_, _, _| Err(CoachError::prediction("model offline")));
        let (engine, _) = engine_with(predictor);

        let outcome = engine.generate_for_user_at("u1", now()).await.unwrap();
        assert!(outcome.messages.is_empty());
        assert!(outcome.analysis_error.is_some());
        assert_eq!(engine.stats().snapshot().analysis_errors, 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (engine, _) = engine_with(predicting(high_risk()));
        let err = engine.generate_for_user_at("nobody", now()).await.unwrap_err();
        assert!(matches!(err, CoachError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_interaction_updates_profile_and_template() {
        let (engine, store) = engine_with(predicting(high_risk()));
        engine.seed_default_templates().unwrap();
        let outcome = engine.generate_for_user_at("u1", now()).await.unwrap();
        let message = outcome.messages[0].clone();

        let later = now() + Duration::hours(1);
        engine.deliver_due_at(later).await.unwrap();
        let acted = engine
            .record_interaction_at(message.id, InteractionType::ActedOn, later)
            .unwrap();
        assert_eq!(acted.status, MessageStatus::ActedOn);

        let profile = store.get_profile("u1").unwrap().unwrap();
        assert_eq!(profile.total_engaged, 1);
        assert!(profile.engagement_scores[&message.message_type] > 0.0);

        let template = store
            .find_templates(&TemplateQuery::all_active())
            .unwrap()
            .into_iter()
            .find(|t| Some(t.id) == message.template_id)
            .unwrap();
        assert_eq!(template.usage_count, 1);
        assert_eq!(template.engagement_count, 1);
    }

    #[tokio::test]
    async fn test_interaction_on_pending_is_rejected() {
        let (engine, store) = engine_with(predicting(high_risk()));
        let msg = CoachingMessage::new("u1", MessageType::MotivationBoost, "t", "b", now());
        store.insert_message(&msg).unwrap();
        let err = engine
            .record_interaction_at(msg.id, InteractionType::ActedOn, now())
            .unwrap_err();
        assert!(matches!(err, CoachError::InvalidTransition { .. }));
    }

    #[test]
    fn test_list_messages_rejects_oversized_page() {
        let (engine, _) = engine_with(MockPredictor::new());
        let request = ListMessages {
            limit: Some(MAX_PAGE_SIZE + 1),
            ..Default::default()
        };
        assert!(engine.list_messages("u1", &request).is_err());
    }

    #[test]
    fn test_health_flags_stuck_pending() {
        let (engine, store) = engine_with(MockPredictor::new());
        let old = CoachingMessage::new("u1", MessageType::MotivationBoost, "t", "b", now() - Duration::hours(7));
        store.insert_message(&old).unwrap();
        let snapshot = engine.system_health_at(now()).unwrap();
        assert_eq!(snapshot.stuck_pending, 1);
        assert_eq!(snapshot.status, HealthStatus::Warning);
    }

    #[test]
    fn test_retention_keeps_recent_acted_on() {
        let (engine, store) = engine_with(MockPredictor::new());
        let created = now() - Duration::days(120);
        let mut acted = CoachingMessage::new("u1", MessageType::MotivationBoost, "t", "b", created);
        acted.transition(MessageStatus::Sent, created).unwrap();
        acted.transition(MessageStatus::ActedOn, created).unwrap();
        let mut expired = CoachingMessage::new("u1", MessageType::MotivationBoost, "t", "b", created);
        expired.transition(MessageStatus::Expired, created).unwrap();
        store.insert_message(&acted).unwrap();
        store.insert_message(&expired).unwrap();

        let report = engine.retention_cleanup_at(now()).unwrap();
        assert_eq!(report, RetentionReport { ordinary: 1, acted_on: 0 });
        assert!(store.get_message(acted.id).unwrap().is_some());
        assert!(store.get_message(expired.id).unwrap().is_none());
    }

    #[test]
    fn test_rollup_counts_previous_day() {
        let (engine, store) = engine_with(MockPredictor::new());
        let yesterday = now() - Duration::days(1);
        let mut sent = CoachingMessage::new("u1", MessageType::MotivationBoost, "t", "b", yesterday);
        sent.transition(MessageStatus::Sent, yesterday).unwrap();
        sent.transition(MessageStatus::Read, yesterday).unwrap();
        store.insert_message(&sent).unwrap();
        store
            .insert_message(&CoachingMessage::new("u1", MessageType::MotivationBoost, "t", "b", now()))
            .unwrap();

        let rollups = engine.analytics_rollup_at(now()).unwrap();
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].created, 1);
        assert_eq!(rollups[0].sent, 1);
        assert_eq!(rollups[0].read, 1);
        assert_eq!(rollups[0].acted_on, 0);
        assert_eq!(store.rollups_for_day(rollups[0].day).unwrap().len(), 1);
    }

    /// Delegates to SQLite but cannot read one user's profile.
    struct BrokenProfileStore {
        inner: Arc<SqliteCoachStore>,
        broken_user: &'static str,
    }

    impl CoachStore for BrokenProfileStore {
        fn get_profile(&self, user_id: &str) -> CoachResult<Option<PersonalizationProfile>> {
            if user_id == self.broken_user {
                return Err(CoachError::database("profile row unreadable"));
            }
            self.inner.get_profile(user_id)
        }
        fn upsert_profile(&self, profile: &PersonalizationProfile) -> CoachResult<()> {
            self.inner.upsert_profile(profile)
        }
        fn insert_template(&self, template: &crate::types::MessageTemplate) -> CoachResult<()> {
            self.inner.insert_template(template)
        }
        fn find_templates(&self, query: &TemplateQuery) -> CoachResult<Vec<crate::types::MessageTemplate>> {
            self.inner.find_templates(query)
        }
        fn count_templates(&self) -> CoachResult<usize> {
            self.inner.count_templates()
        }
        fn bump_template_counters(&self, id: Uuid, usage: u64, engagement: u64) -> CoachResult<()> {
            self.inner.bump_template_counters(id, usage, engagement)
        }
        fn insert_message(&self, message: &CoachingMessage) -> CoachResult<()> {
            self.inner.insert_message(message)
        }
        fn get_message(&self, id: Uuid) -> CoachResult<Option<CoachingMessage>> {
            self.inner.get_message(id)
        }
        fn find_messages(
            &self,
            query: &MessageQuery,
            sort: MessageSort,
            limit: usize,
            offset: usize,
        ) -> CoachResult<Vec<CoachingMessage>> {
            self.inner.find_messages(query, sort, limit, offset)
        }
        fn count_messages(&self, query: &MessageQuery) -> CoachResult<usize> {
            self.inner.count_messages(query)
        }
        fn update_message(&self, message: &CoachingMessage) -> CoachResult<()> {
            self.inner.update_message(message)
        }
        fn claim_for_delivery(&self, id: Uuid, now: DateTime<Utc>) -> CoachResult<bool> {
            self.inner.claim_for_delivery(id, now)
        }
        fn release_claim(&self, id: Uuid, prior: MessageStatus, now: DateTime<Utc>) -> CoachResult<()> {
            self.inner.release_claim(id, prior, now)
        }
        fn expire_overdue(&self, now: DateTime<Utc>) -> CoachResult<usize> {
            self.inner.expire_overdue(now)
        }
        fn delete_messages(&self, query: &MessageQuery) -> CoachResult<usize> {
            self.inner.delete_messages(query)
        }
        fn save_rollup(&self, rollup: &AnalyticsRollup) -> CoachResult<()> {
            self.inner.save_rollup(rollup)
        }
        fn rollups_for_day(&self, day: chrono::NaiveDate) -> CoachResult<Vec<AnalyticsRollup>> {
            self.inner.rollups_for_day(day)
        }
    }

    #[tokio::test]
    async fn test_sweep_batches_users_and_isolates_failures() {
        let sqlite = Arc::new(SqliteCoachStore::in_memory().unwrap());
        for id in ["u1", "u2", "u3", "u4"] {
            sqlite
                .insert_user(&UserRecord::new(id, "Ada Lovelace", now() - Duration::days(30)))
                .unwrap();
        }
        let store = Arc::new(BrokenProfileStore {
            inner: sqlite.clone(),
            broken_user: "u3",
        });
        let mut config = CoachConfig::default();
        config.generation.batch_size = 2;
        config.generation.batch_pause_ms = 0;
        let engine = CoachingEngine::new(
            config,
            store,
            sqlite.clone(),
            Arc::new(predicting(high_risk())),
            Arc::new(MockNotifier::new()),
        );
        engine.seed_default_templates().unwrap();

        let report = engine.generate_sweep_at(now()).await.unwrap();
        assert_eq!(report.users, 4);
        assert_eq!(report.batches, 2);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.drafts, sqlite.count_messages(&MessageQuery::default()).unwrap());
        assert!(report.drafts >= 3);
        assert_eq!(engine.stats().snapshot().generation_errors, 1);

        for id in ["u1", "u2", "u4"] {
            assert!(sqlite.count_messages(&MessageQuery::for_user(id)).unwrap() > 0);
        }
        assert_eq!(sqlite.count_messages(&MessageQuery::for_user("u3")).unwrap(), 0);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let (engine, _) = engine_with(MockPredictor::new());
        assert!(engine.seed_default_templates().unwrap() > 0);
        assert_eq!(engine.seed_default_templates().unwrap(), 0);
    }
}

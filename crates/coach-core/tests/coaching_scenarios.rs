//! End-to-end coaching scenarios against the in-memory SQLite store.
//!
//! Collaborators are small hand-written fakes so the scenarios read the same
//! way the engine sees them in production.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};

use coach_core::coaching::DeliveryScheduler;
use coach_core::config::{DeliveryConfig, GovernorConfig};
use coach_core::error::{CoachError, CoachResult};
use coach_core::traits::{CoachStore, Notification, Notifier, Predictor};
use coach_core::types::{
    ActivityRecord, CoachingMessage, FrequencyTier, MessagePriority, MessageQuery, MessageStatus,
    MessageTemplate, MessageType, PersonalizationProfile, PredictionBundle, RiskLevel, UserRecord,
    ValueRecord,
};
use coach_core::{CoachConfig, CoachingEngine, SqliteCoachStore};

/// Returns the same bundle for every user.
struct FixedPredictor(PredictionBundle);

#[async_trait]
impl Predictor for FixedPredictor {
    async fn predict(
        &self,
        _user: &UserRecord,
        _activities: &[ActivityRecord],
        _values: &[ValueRecord],
    ) -> CoachResult<PredictionBundle> {
        Ok(self.0.clone())
    }
}

/// Counts deliveries, optionally failing every call.
#[derive(Default)]
struct CountingNotifier {
    delivered: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn deliver(&self, _notification: &Notification) -> CoachResult<()> {
        if self.fail {
            return Err(CoachError::delivery("transport down"));
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    store: Arc<SqliteCoachStore>,
    notifier: Arc<CountingNotifier>,
    engine: CoachingEngine,
}

fn harness(predictions: PredictionBundle) -> Harness {
    let store = Arc::new(SqliteCoachStore::in_memory().unwrap());
    let notifier = Arc::new(CountingNotifier::default());
    let engine = CoachingEngine::new(
        CoachConfig::default(),
        store.clone(),
        store.clone(),
        Arc::new(FixedPredictor(predictions)),
        notifier.clone(),
    );
    engine.seed_default_templates().unwrap();
    Harness {
        store,
        notifier,
        engine,
    }
}

/// Wednesday 14:00 UTC, outside the morning and evening windows.
fn midday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 14, 0, 0).unwrap()
}

fn high_streak_risk() -> PredictionBundle {
    let mut bundle = PredictionBundle::default();
    bundle.streak_risk.risk_level = RiskLevel::High;
    bundle.streak_risk.risk_score = 0.9;
    bundle.streak_risk.current_streak = 12;
    bundle.streak_risk.hours_since_last_activity = 22.0;
    bundle
}

fn add_user(store: &SqliteCoachStore, id: &str, now: DateTime<Utc>) {
    store
        .insert_user(&UserRecord::new(id, "Grace Hopper", now - Duration::days(120)))
        .unwrap();
}

fn user_messages(store: &SqliteCoachStore, user_id: &str) -> Vec<CoachingMessage> {
    store
        .find_messages(
            &MessageQuery::for_user(user_id),
            Default::default(),
            usize::MAX,
            0,
        )
        .unwrap()
}

#[tokio::test]
async fn test_minimal_tier_rejects_second_message_of_the_day() {
    let now = midday();
    let h = harness(high_streak_risk());
    add_user(&h.store, "u1", now);
    h.store
        .upsert_profile(&PersonalizationProfile::new("u1").with_frequency(FrequencyTier::Minimal))
        .unwrap();
    let earlier = CoachingMessage::new("u1", MessageType::MotivationBoost, "Hi", "Keep going", now - Duration::hours(3));
    h.store.insert_message(&earlier).unwrap();

    let outcome = h.engine.generate_for_user_at("u1", now).await.unwrap();

    assert_eq!(outcome.triggers, vec!["streak_risk".to_string()]);
    assert!(outcome.messages.is_empty());
    assert!(!outcome.rejections.is_empty());
    assert_eq!(user_messages(&h.store, "u1").len(), 1);
}

#[tokio::test]
async fn test_streak_risk_drafts_are_urgent_and_fully_rendered() {
    let now = midday();
    let h = harness(high_streak_risk());
    add_user(&h.store, "u1", now);

    let outcome = h.engine.generate_for_user_at("u1", now).await.unwrap();

    let types: Vec<MessageType> = outcome.messages.iter().map(|m| m.message_type).collect();
    assert!(types.contains(&MessageType::StreakRiskWarning));
    for message in &outcome.messages {
        assert_eq!(message.priority, MessagePriority::Urgent);
        assert_eq!(message.status, MessageStatus::Scheduled);
        assert!(!message.title.contains('{'), "unrendered title: {}", message.title);
        assert!(!message.body.contains('{'), "unrendered body: {}", message.body);
        assert!(message.scheduled_for > now);
    }
    let warning = outcome
        .messages
        .iter()
        .find(|m| m.message_type == MessageType::StreakRiskWarning)
        .unwrap();
    assert!(warning.title.contains("12") || warning.body.contains("12"));
    assert_eq!(user_messages(&h.store, "u1").len(), outcome.messages.len());
}

#[tokio::test]
async fn test_cooldown_blocks_repeat_type() {
    let now = midday();
    let h = harness(high_streak_risk());
    add_user(&h.store, "u1", now);
    h.store
        .upsert_profile(&PersonalizationProfile::new("u1").with_frequency(FrequencyTier::Frequent))
        .unwrap();

    let mut recent = CoachingMessage::new(
        "u1",
        MessageType::StreakRiskWarning,
        "Streak",
        "Keep it alive",
        now - Duration::hours(2),
    );
    recent.transition(MessageStatus::Sent, now - Duration::hours(2)).unwrap();
    h.store.insert_message(&recent).unwrap();

    let outcome = h.engine.generate_for_user_at("u1", now).await.unwrap();

    assert!(outcome
        .messages
        .iter()
        .all(|m| m.message_type != MessageType::StreakRiskWarning));
    assert!(outcome
        .messages
        .iter()
        .any(|m| m.message_type == MessageType::MotivationBoost));
    assert!(outcome.rejections.iter().any(|r| r.contains("streak_risk_warning")));
}

#[tokio::test]
async fn test_generation_twice_in_a_row_does_not_duplicate() {
    let now = midday();
    let h = harness(high_streak_risk());
    add_user(&h.store, "u1", now);

    let first = h.engine.generate_for_user_at("u1", now).await.unwrap();
    let second = h
        .engine
        .generate_for_user_at("u1", now + Duration::minutes(1))
        .await
        .unwrap();

    assert!(!first.messages.is_empty());
    assert!(second.messages.is_empty());
    assert_eq!(user_messages(&h.store, "u1").len(), first.messages.len());
}

#[tokio::test]
async fn test_expired_scheduled_message_is_never_sent() {
    let now = midday();
    let h = harness(PredictionBundle::default());
    add_user(&h.store, "u1", now);

    let mut stale = CoachingMessage::new("u1", MessageType::MorningMotivation, "Morning", "Rise", now - Duration::hours(5))
        .scheduled_for(now - Duration::hours(3))
        .expires_at(now - Duration::hours(1));
    stale.transition(MessageStatus::Scheduled, now - Duration::hours(5)).unwrap();
    h.store.insert_message(&stale).unwrap();

    let report = h.engine.deliver_due_at(now).await.unwrap();

    assert_eq!(report.sent, 0);
    assert_eq!(h.notifier.delivered.load(Ordering::SeqCst), 0);
    let stored = h.store.get_message(stale.id).unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Expired);
    assert!(stored.sent_at.is_none());
}

#[tokio::test]
async fn test_morning_draft_slotted_after_its_expiry_is_expired_not_sent() {
    // Wednesday 07:00 UTC, inside the morning window.
    let morning = Utc.with_ymd_and_hms(2024, 3, 6, 7, 0, 0).unwrap();
    let h = harness(PredictionBundle::default());
    add_user(&h.store, "u1", morning);
    h.store
        .upsert_profile(&PersonalizationProfile::new("u1").with_preferred_hours([18]))
        .unwrap();

    let outcome = h.engine.generate_for_user_at("u1", morning).await.unwrap();
    let draft = outcome
        .messages
        .iter()
        .find(|m| m.message_type == MessageType::MorningMotivation)
        .unwrap();
    assert_eq!(draft.scheduled_for.hour(), 18);
    assert_eq!(draft.expires_at, Some(morning + Duration::hours(4)));

    h.engine.deliver_due_at(draft.scheduled_for).await.unwrap();

    let stored = h.store.get_message(draft.id).unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Expired);
    assert!(stored.sent_at.is_none());
}

#[tokio::test]
async fn test_two_sweeps_deliver_each_message_once() {
    let now = midday();
    let h = harness(PredictionBundle::default());
    add_user(&h.store, "u1", now);
    add_user(&h.store, "u2", now);

    let mut ids = Vec::new();
    for user in ["u1", "u2", "u1"] {
        let message = CoachingMessage::new(user, MessageType::GoalSuggestion, "Goal", "Try this", now - Duration::minutes(30))
            .expires_at(now + Duration::hours(6));
        h.store.insert_message(&message).unwrap();
        ids.push(message.id);
    }

    let first = h.engine.deliver_due_at(now).await.unwrap();
    let second = h.engine.deliver_due_at(now + Duration::seconds(1)).await.unwrap();

    assert_eq!(first.sent, 3);
    assert_eq!(second.sent, 0);
    assert_eq!(h.notifier.delivered.load(Ordering::SeqCst), 3);
    for id in ids {
        let stored = h.store.get_message(id).unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Sent);
    }
    let profile = h.store.get_profile("u1").unwrap().unwrap();
    assert_eq!(profile.total_sent, 2);
}

#[tokio::test]
async fn test_transport_failure_leaves_message_retryable() {
    let now = midday();
    let store = Arc::new(SqliteCoachStore::in_memory().unwrap());
    let engine = CoachingEngine::new(
        CoachConfig::default(),
        store.clone(),
        store.clone(),
        Arc::new(FixedPredictor(PredictionBundle::default())),
        Arc::new(CountingNotifier {
            fail: true,
            ..Default::default()
        }),
    );
    add_user(&store, "u1", now);
    let message = CoachingMessage::new("u1", MessageType::MotivationBoost, "Go", "Now", now);
    store.insert_message(&message).unwrap();

    let report = engine.deliver_due_at(now).await.unwrap();

    assert_eq!(report.failed, 1);
    let stored = store.get_message(message.id).unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Pending);
    assert!(stored.sent_at.is_none());
    assert_eq!(engine.stats().snapshot().delivery_errors, 1);
}

#[test]
fn test_three_drafts_land_on_distinct_preferred_hours() {
    let now = Utc.with_ymd_and_hms(2024, 3, 6, 8, 30, 0).unwrap();
    let config = DeliveryConfig::default();
    let profile = PersonalizationProfile::new("u1").with_preferred_hours([9, 18]);
    let mut drafts: Vec<CoachingMessage> = [
        (MessageType::MilestoneCelebration, 0.9),
        (MessageType::ProgressEncouragement, 0.6),
        (MessageType::GoalSuggestion, 0.4),
    ]
    .into_iter()
    .map(|(message_type, confidence)| {
        CoachingMessage::new("u1", message_type, "t", "b", now)
            .with_priority(MessagePriority::High)
            .with_trigger("milestone", confidence)
    })
    .collect();

    DeliveryScheduler::new(&config)
        .schedule(&mut drafts, &profile, Vec::new(), now)
        .unwrap();

    let mut slots: Vec<DateTime<Utc>> = drafts.iter().map(|d| d.scheduled_for).collect();
    for slot in &slots {
        assert!([9, 18].contains(&slot.hour()), "slot {} off preferred hours", slot);
        assert!(*slot > now);
    }
    slots.sort();
    for pair in slots.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::minutes(config.min_spacing_minutes));
    }
    assert!(drafts.iter().all(|d| d.status == MessageStatus::Scheduled));
}

#[test]
fn test_quiet_hours_respected_unless_urgent_has_no_option() {
    let config = DeliveryConfig::default();
    let profile = PersonalizationProfile::new("u1");

    // 05:00 is quiet; 09:00 is the next preferred, non-quiet hour that day.
    let early = Utc.with_ymd_and_hms(2024, 3, 6, 5, 0, 0).unwrap();
    let mut urgent = vec![CoachingMessage::new("u1", MessageType::StreakRiskWarning, "t", "b", early)
        .with_priority(MessagePriority::Urgent)];
    DeliveryScheduler::new(&config)
        .schedule(&mut urgent, &profile, Vec::new(), early)
        .unwrap();
    assert_eq!(urgent[0].scheduled_for, Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap());

    // 23:30 leaves nothing later that day, so the urgent draft goes out ASAP.
    let late = Utc.with_ymd_and_hms(2024, 3, 6, 23, 30, 0).unwrap();
    let mut drafts = vec![
        CoachingMessage::new("u1", MessageType::StreakRiskWarning, "t", "b", late)
            .with_priority(MessagePriority::Urgent),
        CoachingMessage::new("u1", MessageType::GoalSuggestion, "t", "b", late)
            .with_priority(MessagePriority::Medium),
    ];
    DeliveryScheduler::new(&config)
        .schedule(&mut drafts, &profile, Vec::new(), late)
        .unwrap();
    assert_eq!(drafts[0].priority, MessagePriority::Urgent);
    assert_eq!(drafts[0].scheduled_for, late + Duration::minutes(config.urgent_offset_minutes));
    let regular = &drafts[1];
    assert!(!profile.is_quiet_hour(regular.scheduled_for.hour()));
    assert_eq!(regular.scheduled_for, Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap());
}

#[test]
fn test_template_with_name_and_streak_renders_cleanly() {
    let template = MessageTemplate::new(
        MessageType::StreakRiskWarning,
        "streak_check",
        "{user_first_name}, keep going",
        "Day {current_streak} is within reach.",
    );
    template.validate().unwrap();
    let context: HashMap<String, String> = [
        ("user_first_name".to_string(), "Grace".to_string()),
        ("current_streak".to_string(), "12".to_string()),
    ]
    .into_iter()
    .collect();

    let rendered = template.render(&context).unwrap();

    assert_eq!(rendered.title, "Grace, keep going");
    assert_eq!(rendered.body, "Day 12 is within reach.");

    let missing = template.render(&HashMap::new()).unwrap_err();
    assert!(matches!(missing, CoachError::Composition { .. }));
}

#[test]
fn test_cap_table_is_closed_over_tiers() {
    let governor = GovernorConfig::default();
    assert_eq!(governor.daily_caps.cap_for(FrequencyTier::Minimal), 1);
    assert_eq!(governor.daily_caps.cap_for(FrequencyTier::Optimal), 3);
    assert_eq!(governor.daily_caps.cap_for(FrequencyTier::Frequent), 5);
    assert_eq!(governor.daily_caps.cap_for(FrequencyTier::Daily), 2);
}

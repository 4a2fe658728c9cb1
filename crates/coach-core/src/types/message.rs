//! Coaching message types and lifecycle.
//!
//! A [`CoachingMessage`] is the persisted unit of work. Its [`MessageStatus`]
//! follows a fixed state machine:
//!
//! ```text
//! PENDING -> SCHEDULED -> SENT -> READ -> ACTED_ON
//!    |           |          |       |
//!    +-----------+--> EXPIRED / CANCELLED (terminal)
//!                           |       |
//!                           +-------+--> SCHEDULED (snooze), CANCELLED (dismiss)
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use uuid::Uuid;

use crate::error::{CoachError, CoachResult};

/// Closed set of coaching message types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Warning that an active streak is about to break.
    StreakRiskWarning,
    /// General push to get moving again.
    MotivationBoost,
    /// Celebration of a streak milestone.
    MilestoneCelebration,
    /// Encouragement for strong habit-formation progress.
    ProgressEncouragement,
    /// Support after a user returns from a gap.
    ComebackSupport,
    /// Suggestion of a new goal.
    GoalSuggestion,
    /// Insight about the user's best time of day.
    TimingOptimization,
    /// Harder challenge for advanced users.
    GrowthChallenge,
    WeekendMotivation,
    MorningMotivation,
    EveningReflection,
}

impl MessageType {
    /// Types whose delivery is costly when wrong and need higher confidence.
    pub fn is_high_stakes(&self) -> bool {
        matches!(self, Self::StreakRiskWarning | Self::ComebackSupport)
    }

    /// Default cooldown between two messages of this type for the same user.
    pub fn default_cooldown_hours(&self) -> u32 {
        match self {
            Self::StreakRiskWarning => 12,
            Self::MotivationBoost => 24,
            Self::MilestoneCelebration => 24,
            Self::ProgressEncouragement => 48,
            Self::ComebackSupport => 72,
            Self::GoalSuggestion => 72,
            Self::TimingOptimization => 168,
            Self::GrowthChallenge => 168,
            Self::WeekendMotivation => 48,
            Self::MorningMotivation => 20,
            Self::EveningReflection => 20,
        }
    }

    /// Default lifetime of an undelivered message of this type.
    pub fn default_expiry_hours(&self) -> u32 {
        match self {
            Self::StreakRiskWarning => 6,
            Self::MorningMotivation | Self::EveningReflection => 4,
            Self::WeekendMotivation => 24,
            Self::TimingOptimization | Self::GrowthChallenge | Self::GoalSuggestion => 72,
            _ => 24,
        }
    }
}

/// Delivery priority. Ordering is ascending urgency.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl MessagePriority {
    /// Numeric rank used for store-side ordering.
    pub fn rank(&self) -> i64 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Urgent => 3,
        }
    }
}

/// Voice a message is written in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageTone {
    #[default]
    Encouraging,
    Celebratory,
    Supportive,
    Direct,
    Playful,
    Reflective,
}

/// Lifecycle state of a coaching message.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Scheduled,
    Sent,
    Read,
    ActedOn,
    Expired,
    Cancelled,
}

impl MessageStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }

    /// Whether the message still waits for delivery.
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }

    /// Whether the message counts against frequency caps.
    pub fn counts_toward_cap(&self) -> bool {
        !self.is_terminal()
    }

    /// Check whether the lifecycle permits moving to `next`.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Pending, Sent)
                | (Pending, Expired)
                | (Pending, Cancelled)
                | (Scheduled, Scheduled)
                | (Scheduled, Sent)
                | (Scheduled, Expired)
                | (Scheduled, Cancelled)
                | (Sent, Read)
                | (Sent, ActedOn)
                | (Sent, Scheduled)
                | (Sent, Cancelled)
                | (Read, ActedOn)
                | (Read, Scheduled)
                | (Read, Cancelled)
        )
    }

    /// Statuses still waiting for delivery.
    pub fn queued() -> Vec<MessageStatus> {
        vec![Self::Pending, Self::Scheduled]
    }

    /// Statuses that count against frequency caps.
    pub fn live() -> Vec<MessageStatus> {
        Self::iter().filter(|s| s.counts_toward_cap()).collect()
    }
}

/// How a user interacted with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionType {
    /// The message was opened.
    Read,
    /// The user followed the message's call to action.
    ActedOn,
    /// The user dismissed the message.
    Dismissed,
    /// The user asked to be reminded later.
    Snoozed {
        #[serde(default)]
        minutes: Option<u32>,
    },
}

impl InteractionType {
    /// Engagement signal fed into the per-type moving average, if any.
    pub fn engagement_signal(&self) -> Option<f64> {
        match self {
            Self::Read => Some(0.5),
            Self::ActedOn => Some(1.0),
            Self::Dismissed => Some(0.0),
            Self::Snoozed { .. } => None,
        }
    }

    /// Status the message moves to.
    pub fn target_status(&self) -> MessageStatus {
        match self {
            Self::Read => MessageStatus::Read,
            Self::ActedOn => MessageStatus::ActedOn,
            Self::Dismissed => MessageStatus::Cancelled,
            Self::Snoozed { .. } => MessageStatus::Scheduled,
        }
    }
}

/// The persisted unit of coaching work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingMessage {
    pub id: Uuid,
    pub user_id: String,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub tone: MessageTone,
    pub title: String,
    pub body: String,
    pub action_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    pub status: MessageStatus,
    pub scheduled_for: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Confidence of the trigger that produced this message.
    pub ml_confidence: f64,
    /// Tag of the behavioral trigger, kept for analytics.
    pub behavioral_trigger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acted_on_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub snooze_count: u32,
}

impl CoachingMessage {
    /// Create a new pending message scheduled for `now`.
    pub fn new(
        user_id: impl Into<String>,
        message_type: MessageType,
        title: impl Into<String>,
        body: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            message_type,
            priority: MessagePriority::default(),
            tone: MessageTone::default(),
            title: title.into(),
            body: body.into(),
            action_text: None,
            action_url: None,
            status: MessageStatus::Pending,
            scheduled_for: now,
            expires_at: None,
            ml_confidence: 0.0,
            behavioral_trigger: String::new(),
            template_id: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
            read_at: None,
            acted_on_at: None,
            cancelled_at: None,
            snooze_count: 0,
        }
    }

    /// Builder method to set priority.
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder method to set tone.
    pub fn with_tone(mut self, tone: MessageTone) -> Self {
        self.tone = tone;
        self
    }

    /// Builder method to set the expiry.
    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Builder method to set the delivery time.
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = at;
        self
    }

    /// Builder method to set the call to action.
    pub fn with_action(mut self, text: impl Into<String>, url: Option<String>) -> Self {
        self.action_text = Some(text.into());
        self.action_url = url;
        self
    }

    /// Builder method to attach the originating trigger.
    pub fn with_trigger(mut self, tag: impl Into<String>, confidence: f64) -> Self {
        self.behavioral_trigger = tag.into();
        self.ml_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Whether the message is past its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Move to `next`, stamping the matching timestamp.
    pub fn transition(&mut self, next: MessageStatus, now: DateTime<Utc>) -> CoachResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoachError::invalid_transition(self.status, next));
        }
        match next {
            MessageStatus::Sent => self.sent_at = Some(now),
            MessageStatus::Read => self.read_at = Some(now),
            MessageStatus::ActedOn => {
                if self.read_at.is_none() {
                    self.read_at = Some(now);
                }
                self.acted_on_at = Some(now);
            }
            MessageStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Reschedule a delivered message for later delivery.
    pub fn snooze(&mut self, minutes: u32, now: DateTime<Utc>) -> CoachResult<()> {
        if !matches!(self.status, MessageStatus::Sent | MessageStatus::Read) {
            return Err(CoachError::invalid_transition(self.status, MessageStatus::Scheduled));
        }
        self.transition(MessageStatus::Scheduled, now)?;
        self.scheduled_for = now + Duration::minutes(i64::from(minutes));
        if let Some(exp) = self.expires_at {
            if exp <= self.scheduled_for {
                self.expires_at = Some(self.scheduled_for + Duration::hours(1));
            }
        }
        self.snooze_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(now: DateTime<Utc>) -> CoachingMessage {
        CoachingMessage::new("user-1", MessageType::MotivationBoost, "Hi", "Keep going", now)
    }

    #[test]
    fn test_new_message_starts_pending() {
        let msg = message(Utc::now());
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.priority, MessagePriority::Medium);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [MessageStatus::Expired, MessageStatus::Cancelled] {
            for next in MessageStatus::iter() {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_pending_cannot_skip_to_acted_on() {
        let now = Utc::now();
        let mut msg = message(now);
        assert!(msg.transition(MessageStatus::ActedOn, now).is_err());
        assert_eq!(msg.status, MessageStatus::Pending);
    }

    #[test]
    fn test_full_happy_path_stamps_times() {
        let now = Utc::now();
        let mut msg = message(now);
        msg.transition(MessageStatus::Scheduled, now).unwrap();
        msg.transition(MessageStatus::Sent, now).unwrap();
        msg.transition(MessageStatus::Read, now).unwrap();
        msg.transition(MessageStatus::ActedOn, now).unwrap();
        assert!(msg.sent_at.is_some());
        assert!(msg.read_at.is_some());
        assert!(msg.acted_on_at.is_some());
    }

    #[test]
    fn test_snooze_requires_delivery() {
        let now = Utc::now();
        let mut msg = message(now);
        assert!(msg.snooze(30, now).is_err());

        msg.transition(MessageStatus::Sent, now).unwrap();
        msg.snooze(30, now).unwrap();
        assert_eq!(msg.status, MessageStatus::Scheduled);
        assert_eq!(msg.scheduled_for, now + Duration::minutes(30));
        assert_eq!(msg.snooze_count, 1);
    }

    #[test]
    fn test_snooze_extends_expiry_past_new_slot() {
        let now = Utc::now();
        let mut msg = message(now).expires_at(now + Duration::minutes(10));
        msg.transition(MessageStatus::Sent, now).unwrap();
        msg.snooze(60, now).unwrap();
        assert!(msg.expires_at.unwrap() > msg.scheduled_for);
    }

    #[test]
    fn test_expired_at_boundary() {
        let now = Utc::now();
        let msg = message(now - Duration::hours(2)).expires_at(now - Duration::hours(1));
        assert!(msg.is_expired_at(now));
        assert!(msg.is_expired_at(now - Duration::hours(1)));
        assert!(!msg.is_expired_at(now - Duration::hours(2)));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(MessagePriority::Urgent > MessagePriority::High);
        assert!(MessagePriority::High > MessagePriority::Medium);
        assert_eq!(MessagePriority::Urgent.rank(), 3);
    }

    #[test]
    fn test_type_names_are_snake_case() {
        assert_eq!(MessageType::StreakRiskWarning.to_string(), "streak_risk_warning");
        let parsed: MessageType = "comeback_support".parse().unwrap();
        assert_eq!(parsed, MessageType::ComebackSupport);
        assert!(parsed.is_high_stakes());
    }

    #[test]
    fn test_interaction_serialization() {
        let snooze = InteractionType::Snoozed { minutes: Some(15) };
        let json = serde_json::to_string(&snooze).unwrap();
        assert!(json.contains("snoozed"));
        let back: InteractionType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snooze);
        assert_eq!(InteractionType::Dismissed.target_status(), MessageStatus::Cancelled);
    }
}

//! Per-user personalization profile.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{CoachError, CoachResult};
use crate::types::{MessageTone, MessageType};

/// Weight of the previous value in the engagement moving average.
pub const ENGAGEMENT_DECAY: f64 = 0.8;

/// Preference weights below this value mean the category is switched off.
pub const DISABLED_PREFERENCE: f64 = 0.1;

/// How many messages a user wants per day.
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
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FrequencyTier {
    Minimal,
    #[default]
    Optimal,
    Frequent,
    Daily,
}

/// One profile per user, read at generation time and written at interaction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizationProfile {
    pub user_id: String,
    pub preferred_tone: MessageTone,
    pub frequency: FrequencyTier,
    /// Local hours (0-23) during which nothing non-urgent is delivered.
    pub quiet_hours: BTreeSet<u8>,
    /// Local hours (0-23) the user prefers to hear from us.
    pub preferred_hours: BTreeSet<u8>,
    /// IANA timezone used to interpret the hour sets.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Per-type preference weight in [0, 1].
    #[serde(default)]
    pub type_preferences: HashMap<MessageType, f64>,
    /// Per-type engagement moving average in [0, 1].
    #[serde(default)]
    pub engagement_scores: HashMap<MessageType, f64>,
    #[serde(default)]
    pub total_sent: u64,
    #[serde(default)]
    pub total_engaged: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_sent: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl PersonalizationProfile {
    /// Create a profile with default settings.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            preferred_tone: MessageTone::default(),
            frequency: FrequencyTier::default(),
            quiet_hours: [22, 23, 0, 1, 2, 3, 4, 5, 6].into_iter().collect(),
            preferred_hours: [9, 12, 18].into_iter().collect(),
            timezone: default_timezone(),
            type_preferences: HashMap::new(),
            engagement_scores: HashMap::new(),
            total_sent: 0,
            total_engaged: 0,
            last_message_sent: None,
            updated_at: Utc::now(),
        }
    }

    /// Builder method to set the quiet hours.
    pub fn with_quiet_hours(mut self, hours: impl IntoIterator<Item = u8>) -> Self {
        self.quiet_hours = hours.into_iter().collect();
        self
    }

    /// Builder method to set the preferred hours.
    pub fn with_preferred_hours(mut self, hours: impl IntoIterator<Item = u8>) -> Self {
        self.preferred_hours = hours.into_iter().collect();
        self
    }

    /// Builder method to set the frequency tier.
    pub fn with_frequency(mut self, tier: FrequencyTier) -> Self {
        self.frequency = tier;
        self
    }

    /// Builder method to set the timezone.
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    /// Builder method to set one type preference.
    pub fn with_preference(mut self, message_type: MessageType, weight: f64) -> Self {
        self.type_preferences
            .insert(message_type, weight.clamp(0.0, 1.0));
        self
    }

    /// Resolved timezone. Unknown names fall back to UTC.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn is_quiet_hour(&self, hour: u32) -> bool {
        u8::try_from(hour).is_ok_and(|h| self.quiet_hours.contains(&h))
    }

    /// An empty preferred set means every hour is acceptable.
    pub fn is_preferred_hour(&self, hour: u32) -> bool {
        self.preferred_hours.is_empty()
            || u8::try_from(hour).is_ok_and(|h| self.preferred_hours.contains(&h))
    }

    /// Preference weight for a type, `default` when unset.
    pub fn preference_for(&self, message_type: MessageType, default: f64) -> f64 {
        self.type_preferences
            .get(&message_type)
            .copied()
            .unwrap_or(default)
    }

    /// Record an engagement signal for a message type.
    pub fn record_engagement(&mut self, message_type: MessageType, signal: f64, now: DateTime<Utc>) {
        let signal = signal.clamp(0.0, 1.0);
        let updated = match self.engagement_scores.get(&message_type) {
            Some(old) => ENGAGEMENT_DECAY * old + (1.0 - ENGAGEMENT_DECAY) * signal,
            None => signal,
        };
        self.engagement_scores
            .insert(message_type, updated.clamp(0.0, 1.0));
        if signal >= 1.0 {
            self.total_engaged += 1;
        }
        self.updated_at = now;
    }

    /// Record that a message was delivered.
    pub fn record_sent(&mut self, now: DateTime<Utc>) {
        self.total_sent += 1;
        self.last_message_sent = Some(now);
        self.updated_at = now;
    }

    /// Share of delivered messages that drew engagement.
    pub fn engagement_rate(&self) -> f64 {
        if self.total_sent == 0 {
            0.0
        } else {
            (self.total_engaged as f64 / self.total_sent as f64).min(1.0)
        }
    }

    /// Check the profile's invariants.
    pub fn validate(&self) -> CoachResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(CoachError::validation("profile user_id must not be empty"));
        }
        for (field, hours) in [("quiet_hours", &self.quiet_hours), ("preferred_hours", &self.preferred_hours)] {
            if let Some(bad) = hours.iter().find(|h| **h > 23) {
                return Err(CoachError::out_of_range(
                    field,
                    format!("hour {} is not in 0..=23", bad),
                ));
            }
        }
        if self.timezone.parse::<Tz>().is_err() {
            return Err(CoachError::validation_with_suggestion(
                format!("unknown timezone '{}'", self.timezone),
                "Use an IANA name such as 'Europe/Berlin'",
            ));
        }
        for (kind, value) in self
            .type_preferences
            .iter()
            .chain(self.engagement_scores.iter())
        {
            if !(0.0..=1.0).contains(value) {
                return Err(CoachError::out_of_range(
                    kind.to_string(),
                    format!("weight {} is not in [0, 1]", value),
                ));
            }
        }
        Ok(())
    }
}

/// Partial update applied through the profile endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub preferred_tone: Option<MessageTone>,
    pub frequency: Option<FrequencyTier>,
    pub quiet_hours: Option<BTreeSet<u8>>,
    pub preferred_hours: Option<BTreeSet<u8>>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub type_preferences: HashMap<MessageType, f64>,
}

impl ProfileUpdate {
    /// Apply onto `profile` and re-validate.
    pub fn apply(self, profile: &mut PersonalizationProfile, now: DateTime<Utc>) -> CoachResult<()> {
        let mut next = profile.clone();
        if let Some(tone) = self.preferred_tone {
            next.preferred_tone = tone;
        }
        if let Some(tier) = self.frequency {
            next.frequency = tier;
        }
        if let Some(hours) = self.quiet_hours {
            next.quiet_hours = hours;
        }
        if let Some(hours) = self.preferred_hours {
            next.preferred_hours = hours;
        }
        if let Some(tz) = self.timezone {
            next.timezone = tz;
        }
        for (kind, weight) in self.type_preferences {
            next.type_preferences.insert(kind, weight);
        }
        next.validate()?;
        next.updated_at = now;
        *profile = next;
        Ok(())
    }
}

//! Frequency governance: daily caps, per-type cooldowns, preference and
//! confidence thresholds.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::coaching::triggers::BehavioralTrigger;
use crate::config::GovernorConfig;
use crate::error::CoachResult;
use crate::traits::CoachStore;
use crate::types::{MessageQuery, MessageStatus, MessageTemplate, MessageType, PersonalizationProfile};

/// Why a trigger or one of its types was turned down.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    PreferenceDisabled { score: f64 },
    DailyCapReached { count: usize, cap: u32 },
    Cooldown { message_type: MessageType, hours: u32 },
    LowConfidence { message_type: MessageType, confidence: f64, required: f64 },
    AlreadyDrafted { message_type: MessageType },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreferenceDisabled { score } => write!(f, "preference {:.2} below threshold", score),
            Self::DailyCapReached { count, cap } => write!(f, "daily cap reached ({}/{})", count, cap),
            Self::Cooldown { message_type, hours } => {
                write!(f, "{} in {}h cooldown", message_type, hours)
            }
            Self::LowConfidence {
                message_type,
                confidence,
                required,
            } => write!(
                f,
                "{} confidence {:.2} below {:.2}",
                message_type, confidence, required
            ),
            Self::AlreadyDrafted { message_type } => {
                write!(f, "{} already drafted this cycle", message_type)
            }
        }
    }
}

/// Outcome of governing one trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum GovernorDecision {
    /// At least one type may be drafted. `skipped` lists the types that were not.
    Approved {
        types: Vec<MessageType>,
        skipped: Vec<Rejection>,
    },
    Rejected(Vec<Rejection>),
}

impl GovernorDecision {
    pub fn approved_types(&self) -> &[MessageType] {
        match self {
            Self::Approved { types, .. } => types,
            Self::Rejected(_) => &[],
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Drafts produced so far in the current generation cycle for one user.
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    pub drafted: HashSet<MessageType>,
    pub draft_count: usize,
}

impl CycleState {
    pub fn record(&mut self, message_type: MessageType) {
        if self.drafted.insert(message_type) {
            self.draft_count += 1;
        }
    }
}

/// Applies the frequency rules for one user.
pub struct FrequencyGovernor<'a> {
    config: &'a GovernorConfig,
    store: &'a dyn CoachStore,
    templates: &'a [MessageTemplate],
}

impl<'a> FrequencyGovernor<'a> {
    pub fn new(
        config: &'a GovernorConfig,
        store: &'a dyn CoachStore,
        templates: &'a [MessageTemplate],
    ) -> Self {
        Self {
            config,
            store,
            templates,
        }
    }

    /// Mean preference weight over the trigger's candidate types.
    pub fn preference_score(&self, trigger: &BehavioralTrigger, profile: &PersonalizationProfile) -> f64 {
        let types = trigger.candidate_types();
        if types.is_empty() {
            return self.config.default_preference;
        }
        let sum: f64 = types
            .iter()
            .map(|t| profile.preference_for(*t, self.config.default_preference))
            .sum();
        sum / types.len() as f64
    }

    /// Cooldown for a type: the longest among its active templates, else configured.
    pub fn cooldown_hours(&self, message_type: MessageType) -> u32 {
        self.templates
            .iter()
            .filter(|t| t.active && t.message_type == message_type)
            .map(|t| t.cooldown_hours)
            .max()
            .unwrap_or_else(|| self.config.cooldown_hours(message_type))
    }

    fn required_confidence(&self, message_type: MessageType) -> f64 {
        if message_type.is_high_stakes() {
            self.config.high_stakes_confidence
        } else {
            self.config.min_confidence
        }
    }

    /// Decide which of the trigger's types may be drafted now.
    pub fn evaluate(
        &self,
        trigger: &BehavioralTrigger,
        profile: &PersonalizationProfile,
        cycle: &CycleState,
        now: DateTime<Utc>,
    ) -> CoachResult<GovernorDecision> {
        let score = self.preference_score(trigger, profile);
        if score < self.config.disabled_threshold {
            return Ok(GovernorDecision::Rejected(vec![Rejection::PreferenceDisabled {
                score,
            }]));
        }

        let cap = self.config.daily_caps.cap_for(profile.frequency);
        let existing = self.store.count_messages(
            &MessageQuery::for_user(&profile.user_id)
                .with_statuses(MessageStatus::live())
                .created_since(now - Duration::hours(24)),
        )?;
        let count = existing + cycle.draft_count;
        if count >= cap as usize {
            return Ok(GovernorDecision::Rejected(vec![Rejection::DailyCapReached {
                count,
                cap,
            }]));
        }
        let remaining = cap as usize - count;

        let confidence = trigger.confidence();
        let mut approved = Vec::new();
        let mut skipped = Vec::new();
        for &message_type in trigger.candidate_types() {
            if cycle.drafted.contains(&message_type) {
                skipped.push(Rejection::AlreadyDrafted { message_type });
                continue;
            }
            if approved.len() >= remaining {
                skipped.push(Rejection::DailyCapReached {
                    count: count + approved.len(),
                    cap,
                });
                continue;
            }

            let hours = self.cooldown_hours(message_type);
            let recent = self.store.count_messages(
                &MessageQuery::for_user(&profile.user_id)
                    .with_type(message_type)
                    .with_statuses(MessageStatus::live())
                    .active_since(now - Duration::hours(i64::from(hours))),
            )?;
            if recent > 0 {
                skipped.push(Rejection::Cooldown {
                    message_type,
                    hours,
                });
                continue;
            }

            let required = self.required_confidence(message_type);
            if confidence < required {
                skipped.push(Rejection::LowConfidence {
                    message_type,
                    confidence,
                    required,
                });
                continue;
            }
            approved.push(message_type);
        }

        if approved.is_empty() {
            Ok(GovernorDecision::Rejected(skipped))
        } else {
            Ok(GovernorDecision::Approved {
                types: approved,
                skipped,
            })
        }
    }
}

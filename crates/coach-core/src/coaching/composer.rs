//! Template selection and draft composition.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::coaching::triggers::{format_hour, BehavioralTrigger, Urgency};
use crate::error::{CoachError, CoachResult};
use crate::types::{
    substitute, CoachingMessage, MessagePriority, MessageTemplate, MessageType,
    PersonalizationProfile, PredictionBundle, SegmentMatch, UserRecord,
};

const ENGAGEMENT_WEIGHT: f64 = 0.4;
const SEGMENT_WEIGHT: f64 = 0.3;
const TONE_WEIGHT: f64 = 0.2;
const CONFIDENCE_WEIGHT: f64 = 0.1;
const EXACT_SEGMENT_BONUS: f64 = 0.3;
const UNIVERSAL_SEGMENT_BONUS: f64 = 0.2;

/// Built-in copy for types that must never go unsent for lack of a template.
struct Fallback {
    title: &'static str,
    body: &'static str,
    action: Option<&'static str>,
}

fn fallback_for(message_type: MessageType) -> Option<Fallback> {
    let fallback = match message_type {
        MessageType::StreakRiskWarning => Fallback {
            title: "{user_first_name}, your streak needs you",
            body: "You're on a {current_streak}-day streak. One activity today keeps it alive.",
            action: Some("Log an activity"),
        },
        MessageType::MotivationBoost => Fallback {
            title: "A small step counts, {user_first_name}",
            body: "Even five minutes today moves you forward.",
            action: Some("Get started"),
        },
        MessageType::MilestoneCelebration => Fallback {
            title: "{milestone_days} days in a row!",
            body: "You've shown up for {value_name} {milestone_days} days straight. That's how habits stick.",
            action: None,
        },
        MessageType::ComebackSupport => Fallback {
            title: "Welcome back, {user_first_name}",
            body: "Picking things up again after {gap_days} days takes real commitment.",
            action: Some("Plan today"),
        },
        MessageType::ProgressEncouragement => Fallback {
            title: "You're building something real",
            body: "Your habit is {formation_probability}% of the way to sticking. Keep the rhythm.",
            action: None,
        },
        MessageType::GoalSuggestion => Fallback {
            title: "Ready for a new goal?",
            body: "Based on your progress, try this next: {goal_title}.",
            action: Some("Set goal"),
        },
        _ => return None,
    };
    Some(fallback)
}

/// Per-user inputs for composition.
#[derive(Debug, Clone, Copy)]
pub struct ComposeContext<'a> {
    pub user: &'a UserRecord,
    pub profile: &'a PersonalizationProfile,
    pub predictions: &'a PredictionBundle,
    /// Activities in the analysis window.
    pub activity_count: usize,
    pub now: DateTime<Utc>,
}

/// Builds drafts from triggers and templates.
pub struct MessageComposer<'a> {
    templates: &'a [MessageTemplate],
    fallback_expiry_hours: u32,
}

impl<'a> MessageComposer<'a> {
    pub fn new(templates: &'a [MessageTemplate], fallback_expiry_hours: u32) -> Self {
        Self {
            templates,
            fallback_expiry_hours,
        }
    }

    /// Best eligible template for the type, first in input order on ties.
    pub fn select_template(
        &self,
        message_type: MessageType,
        trigger: &BehavioralTrigger,
        ctx: &ComposeContext<'_>,
    ) -> Option<&'a MessageTemplate> {
        let local = ctx.now.with_timezone(&ctx.profile.tz());
        let age_days = ctx.user.account_age_days(ctx.now);
        let confidence = trigger.confidence();

        let mut best: Option<(&MessageTemplate, f64)> = None;
        for template in self.templates {
            if !template.active || template.message_type != message_type {
                continue;
            }
            let targeting = &template.targeting;
            if age_days < i64::from(targeting.min_account_age_days)
                || ctx.activity_count < targeting.min_activity_count as usize
                || (targeting.premium_only && !ctx.user.is_premium)
                || !template.is_usable_at(local.hour(), local.weekday())
            {
                continue;
            }
            let segment_bonus = match targeting.segment_match(ctx.predictions.user_segment) {
                SegmentMatch::Exact => EXACT_SEGMENT_BONUS,
                SegmentMatch::Universal => UNIVERSAL_SEGMENT_BONUS,
                SegmentMatch::Mismatch => continue,
            };
            let tone_match = if template.tone == ctx.profile.preferred_tone {
                1.0
            } else {
                0.0
            };
            let score = ENGAGEMENT_WEIGHT * template.average_engagement()
                + SEGMENT_WEIGHT * segment_bonus
                + TONE_WEIGHT * tone_match
                + CONFIDENCE_WEIGHT * confidence;
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((template, score));
            }
        }
        best.map(|(template, _)| template)
    }

    /// Compose a pending draft of `message_type` for `trigger`.
    pub fn compose(
        &self,
        trigger: &BehavioralTrigger,
        message_type: MessageType,
        ctx: &ComposeContext<'_>,
    ) -> CoachResult<CoachingMessage> {
        let values = substitution_context(trigger, ctx);

        let (title, body, action_text, action_url, template_id, expiry_hours) =
            match self.select_template(message_type, trigger, ctx) {
                Some(template) => {
                    let rendered = template.render(&values)?;
                    (
                        rendered.title,
                        rendered.body,
                        rendered.action_text,
                        template.action_url.clone(),
                        Some(template.id),
                        template.expiry_hours,
                    )
                }
                None => {
                    let fallback =
                        fallback_for(message_type).ok_or_else(|| CoachError::no_template(message_type))?;
                    (
                        substitute(fallback.title, &values)?,
                        substitute(fallback.body, &values)?,
                        fallback
                            .action
                            .map(|a| substitute(a, &values))
                            .transpose()?,
                        None,
                        None,
                        self.fallback_expiry_hours,
                    )
                }
            };

        let mut draft = CoachingMessage::new(&ctx.user.id, message_type, title, body, ctx.now)
            .with_priority(priority_for(trigger.urgency()))
            .with_tone(ctx.profile.preferred_tone)
            .expires_at(ctx.now + Duration::hours(i64::from(expiry_hours)))
            .with_trigger(trigger.tag(), trigger.confidence());
        if let Some(text) = action_text {
            draft = draft.with_action(text, action_url);
        }
        draft.template_id = template_id;
        Ok(draft)
    }
}

/// Message priority derived from trigger urgency.
pub fn priority_for(urgency: Urgency) -> MessagePriority {
    match urgency {
        Urgency::High => MessagePriority::Urgent,
        Urgency::Medium => MessagePriority::High,
        Urgency::Low => MessagePriority::Medium,
    }
}

/// Keys available to every template: user, predictions, then trigger payload.
fn substitution_context(
    trigger: &BehavioralTrigger,
    ctx: &ComposeContext<'_>,
) -> HashMap<String, String> {
    let p = ctx.predictions;
    let mut values: HashMap<String, String> = [
        ("user_name", ctx.user.display_name.clone()),
        ("user_first_name", ctx.user.first_name().to_string()),
        ("current_streak", p.streak_risk.current_streak.to_string()),
        (
            "formation_probability",
            format!("{:.0}", p.habit_formation.probability),
        ),
        ("peak_hour", format_hour(p.optimal_timing.peak_hour)),
        (
            "peak_day",
            p.optimal_timing
                .peak_day
                .clone()
                .unwrap_or_else(|| "any day".to_string()),
        ),
        ("user_segment", p.user_segment.label().to_string()),
        (
            "this_week_activities",
            p.habit_formation.this_week_activities.to_string(),
        ),
        (
            "last_week_activities",
            p.habit_formation.last_week_activities.to_string(),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    values.extend(trigger.context());
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::{MessageStatus, MessageTone, TemplateTargeting, UserSegment};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap()
    }

    fn user() -> UserRecord {
        UserRecord::new("u1", "Ada Lovelace", now() - Duration::days(40))
    }

    fn streak() -> BehavioralTrigger {
        BehavioralTrigger::StreakRisk {
            risk_score: 0.9,
            current_streak: 12,
            hours_since_last_activity: 20.0,
        }
    }

    fn ctx<'a>(
        user: &'a UserRecord,
        profile: &'a PersonalizationProfile,
        predictions: &'a PredictionBundle,
    ) -> ComposeContext<'a> {
        ComposeContext {
            user,
            profile,
            predictions,
            activity_count: 10,
            now: now(),
        }
    }

    #[test]
    fn test_fallback_draft() {
        let user = user();
        let profile = PersonalizationProfile::new("u1");
        let mut predictions = PredictionBundle::default();
        predictions.streak_risk.current_streak = 12;
        let composer = MessageComposer::new(&[], 24);
        let draft = composer
            .compose(&streak(), MessageType::StreakRiskWarning, &ctx(&user, &profile, &predictions))
            .unwrap();
        assert_eq!(draft.title, "Ada, your streak needs you");
        assert!(draft.body.contains("12-day streak"));
        assert_eq!(draft.priority, MessagePriority::Urgent);
        assert_eq!(draft.status, MessageStatus::Pending);
        assert_eq!(draft.expires_at, Some(now() + Duration::hours(24)));
        assert_eq!(draft.behavioral_trigger, "streak_risk");
        assert!(draft.template_id.is_none());
    }

    #[test]
    fn test_missing_fallback_is_composition_error() {
        let user = user();
        let profile = PersonalizationProfile::new("u1");
        let predictions = PredictionBundle::default();
        let composer = MessageComposer::new(&[], 24);
        let trigger = BehavioralTrigger::Morning { local_hour: 7 };
        let err = composer
            .compose(&trigger, MessageType::MorningMotivation, &ctx(&user, &profile, &predictions))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CmpNoTemplate);
    }

    #[test]
    fn test_scoring_prefers_segment_and_tone() {
        let user = user();
        let profile = PersonalizationProfile::new("u1");
        let mut predictions = PredictionBundle::default();
        predictions.user_segment = UserSegment::Regular;
        let templates = vec![
            MessageTemplate::new(MessageType::MotivationBoost, "generic", "Generic", "b")
                .with_tone(MessageTone::Direct),
            MessageTemplate::new(MessageType::MotivationBoost, "regular", "Regular", "b")
                .for_segments([UserSegment::Regular]),
            MessageTemplate::new(MessageType::MotivationBoost, "champ", "Champ", "b")
                .for_segments([UserSegment::Champion]),
        ];
        let composer = MessageComposer::new(&templates, 24);
        let chosen = composer
            .select_template(MessageType::MotivationBoost, &streak(), &ctx(&user, &profile, &predictions))
            .unwrap();
        assert_eq!(chosen.name, "regular");
    }

    #[test]
    fn test_ties_keep_first_template() {
        let user = user();
        let profile = PersonalizationProfile::new("u1");
        let predictions = PredictionBundle::default();
        let templates = vec![
            MessageTemplate::new(MessageType::MotivationBoost, "first", "A", "b"),
            MessageTemplate::new(MessageType::MotivationBoost, "second", "B", "b"),
        ];
        let composer = MessageComposer::new(&templates, 24);
        let chosen = composer
            .select_template(MessageType::MotivationBoost, &streak(), &ctx(&user, &profile, &predictions))
            .unwrap();
        assert_eq!(chosen.name, "first");
    }

    #[test]
    fn test_targeting_filters() {
        let user = user();
        let profile = PersonalizationProfile::new("u1");
        let predictions = PredictionBundle::default();
        let templates = vec![
            MessageTemplate::new(MessageType::MotivationBoost, "premium", "P", "b").with_targeting(
                TemplateTargeting {
                    premium_only: true,
                    ..Default::default()
                },
            ),
            MessageTemplate::new(MessageType::MotivationBoost, "veteran", "V", "b").with_targeting(
                TemplateTargeting {
                    min_account_age_days: 100,
                    ..Default::default()
                },
            ),
            MessageTemplate::new(MessageType::MotivationBoost, "busy", "B", "b").with_targeting(
                TemplateTargeting {
                    min_activity_count: 50,
                    ..Default::default()
                },
            ),
            MessageTemplate::new(MessageType::MotivationBoost, "night", "N", "b")
                .with_optimal_hours([22, 23]),
        ];
        let composer = MessageComposer::new(&templates, 24);
        assert!(composer
            .select_template(MessageType::MotivationBoost, &streak(), &ctx(&user, &profile, &predictions))
            .is_none());
    }

    #[test]
    fn test_template_render_and_expiry() {
        let user = user();
        let profile = PersonalizationProfile::new("u1");
        let predictions = PredictionBundle::default();
        let trigger = BehavioralTrigger::Milestone {
            streak_days: 7,
            value_name: Some("Health".to_string()),
        };
        let templates = vec![MessageTemplate::new(
            MessageType::MilestoneCelebration,
            "milestone",
            "{milestone_days} days of {value_name}",
            "Well done, {user_first_name}.",
        )
        .with_expiry_hours(48)
        .with_action("Share it", Some("app://share"))];
        let composer = MessageComposer::new(&templates, 24);
        let draft = composer
            .compose(&trigger, MessageType::MilestoneCelebration, &ctx(&user, &profile, &predictions))
            .unwrap();
        assert_eq!(draft.title, "7 days of Health");
        assert_eq!(draft.body, "Well done, Ada.");
        assert_eq!(draft.priority, MessagePriority::High);
        assert_eq!(draft.expires_at, Some(now() + Duration::hours(48)));
        assert_eq!(draft.action_url.as_deref(), Some("app://share"));
        assert_eq!(draft.template_id, Some(templates[0].id));
    }

    #[test]
    fn test_unknown_key_fails_only_this_draft() {
        let user = user();
        let profile = PersonalizationProfile::new("u1");
        let predictions = PredictionBundle::default();
        let templates = vec![MessageTemplate::new(
            MessageType::MotivationBoost,
            "broken",
            "Hi {nickname}",
            "b",
        )];
        let composer = MessageComposer::new(&templates, 24);
        let err = composer
            .compose(&streak(), MessageType::MotivationBoost, &ctx(&user, &profile, &predictions))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CmpMissingPlaceholder);
    }
}

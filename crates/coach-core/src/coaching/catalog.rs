//! Built-in template catalogue.

use chrono::Weekday;

use crate::error::CoachResult;
use crate::types::{MessagePriority, MessageTemplate, MessageTone, MessageType, TemplateTargeting, UserSegment};

/// Default templates, at least one per message type.
///
/// Every template is validated before it is returned, so an undeclared
/// placeholder fails here rather than at first render.
pub fn default_templates() -> CoachResult<Vec<MessageTemplate>> {
    let templates = vec![
        MessageTemplate::new(
            MessageType::StreakRiskWarning,
            "streak_risk_direct",
            "Don't lose your {current_streak}-day streak, {user_first_name}",
            "It's been {hours_since_last_activity} hours since your last activity. A quick check-in keeps the streak going.",
        )
        .with_action("Log it now", Some("app://activities/new"))
        .with_tone(MessageTone::Direct),
        MessageTemplate::new(
            MessageType::StreakRiskWarning,
            "streak_risk_supportive",
            "Your streak is still within reach",
            "{user_first_name}, {current_streak} days is worth protecting. Something small today is enough.",
        )
        .with_action("Keep my streak", Some("app://activities/new"))
        .with_tone(MessageTone::Supportive),
        MessageTemplate::new(
            MessageType::MotivationBoost,
            "motivation_small_step",
            "One small step, {user_first_name}",
            "You don't have to do it all today. Pick the easiest thing on your list and start there.",
        )
        .with_action("Get started", None),
        MessageTemplate::new(
            MessageType::MilestoneCelebration,
            "milestone_celebration",
            "{milestone_days} days of {value_name}!",
            "{user_first_name}, you've shown up {milestone_days} days in a row. That's a habit taking shape.",
        )
        .with_tone(MessageTone::Celebratory)
        .with_priority(MessagePriority::High),
        MessageTemplate::new(
            MessageType::ProgressEncouragement,
            "progress_formation",
            "Your habit is sticking",
            "{this_week_activities} activities this week against {last_week_activities} last week. You're {formation_probability}% of the way there.",
        ),
        MessageTemplate::new(
            MessageType::ComebackSupport,
            "comeback_welcome",
            "Good to see you again, {user_first_name}",
            "Coming back after {gap_days} days is the hard part, and you've done it. Before the break you had a {previous_streak}-day run.",
        )
        .with_tone(MessageTone::Supportive)
        .with_action("Plan today", None),
        MessageTemplate::new(
            MessageType::GoalSuggestion,
            "goal_next_step",
            "A goal worth trying: {goal_title}",
            "{goal_rationale}",
        )
        .with_action("Set this goal", Some("app://goals/new"))
        .with_targeting(TemplateTargeting {
            min_account_age_days: 7,
            ..Default::default()
        }),
        MessageTemplate::new(
            MessageType::TimingOptimization,
            "timing_peak_hour",
            "You're at your best around {peak_hour}",
            "Most of your activities happen around {peak_hour} on {peak_day}. Try planning your next one then.",
        )
        .with_tone(MessageTone::Reflective)
        .with_targeting(TemplateTargeting {
            min_activity_count: 10,
            ..Default::default()
        }),
        MessageTemplate::new(
            MessageType::GrowthChallenge,
            "growth_stretch",
            "Ready to stretch, {user_first_name}?",
            "{activity_count} activities in the last two months puts you among our most consistent {user_segment} members. Try adding one more this week.",
        )
        .with_tone(MessageTone::Playful)
        .for_segments([UserSegment::PowerUser, UserSegment::Champion]),
        MessageTemplate::new(
            MessageType::WeekendMotivation,
            "weekend_reset",
            "Happy {weekday}, {user_first_name}",
            "Weekends are a good time to catch up on what the week crowded out.",
        )
        .with_tone(MessageTone::Playful)
        .excluding_days([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]),
        MessageTemplate::new(
            MessageType::MorningMotivation,
            "morning_start",
            "Good morning, {user_first_name}",
            "Starting the day with one intentional activity sets the tone for the rest of it.",
        )
        .with_optimal_hours(6..=10),
        MessageTemplate::new(
            MessageType::EveningReflection,
            "evening_reflect",
            "How did today go?",
            "Take a minute to look back on today, {user_first_name}. What went well?",
        )
        .with_tone(MessageTone::Reflective)
        .with_optimal_hours(17..=21)
        .with_action("Reflect", Some("app://journal/new")),
    ];

    for template in &templates {
        template.validate()?;
    }
    Ok(templates)
}

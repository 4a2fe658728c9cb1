//! Behavioral trigger detection.
//!
//! Each rule inspects the user's recent history and the prediction bundle and
//! emits at most one trigger. Rules are independent; urgency rather than
//! evaluation order decides which trigger matters most.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use strum::{Display, IntoStaticStr};

use crate::types::{
    ActivityRecord, MessageType, PredictionBundle, RiskLevel, UserSegment, ValueRecord,
};

/// Consecutive-day streak lengths worth celebrating.
pub const MILESTONES: [u32; 9] = [3, 7, 14, 21, 30, 60, 90, 180, 365];

/// Minimum gap, in days, that qualifies a return as a comeback.
const COMEBACK_GAP_DAYS: i64 = 3;

/// How many activities before the latest one are inspected for a gap.
const COMEBACK_LOOKBACK: usize = 10;

/// Activity count above which advanced users get growth challenges.
const GROWTH_ACTIVITY_THRESHOLD: usize = 30;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// A detected behavioral condition that may warrant a message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BehavioralTrigger {
    StreakRisk {
        risk_score: f64,
        current_streak: u32,
        hours_since_last_activity: f64,
    },
    Milestone {
        streak_days: u32,
        value_name: Option<String>,
    },
    StrongProgress {
        formation_probability: f64,
    },
    Comeback {
        gap_days: i64,
        previous_streak: u32,
    },
    GoalOpportunity {
        goal_title: String,
        rationale: String,
        confidence: f64,
    },
    TimingInsight {
        peak_hour: Option<u8>,
        peak_day: Option<String>,
        confidence: f64,
    },
    GrowthChallenge {
        segment: UserSegment,
        activity_count: usize,
    },
    Weekend {
        weekday: String,
    },
    Morning {
        local_hour: u32,
    },
    Evening {
        local_hour: u32,
    },
}

impl BehavioralTrigger {
    /// Confidence in [0, 1].
    pub fn confidence(&self) -> f64 {
        let raw = match self {
            Self::StreakRisk { risk_score, .. } => *risk_score,
            Self::Milestone { .. } => 0.9,
            Self::StrongProgress {
                formation_probability,
            } => formation_probability / 100.0,
            Self::Comeback { .. } => 0.8,
            Self::GoalOpportunity { confidence, .. } => *confidence,
            Self::TimingInsight { confidence, .. } => confidence / 100.0,
            Self::GrowthChallenge { .. } => 0.7,
            Self::Weekend { .. } => 0.6,
            Self::Morning { .. } | Self::Evening { .. } => 0.5,
        };
        raw.clamp(0.0, 1.0)
    }

    pub fn urgency(&self) -> Urgency {
        match self {
            Self::StreakRisk { .. } => Urgency::High,
            Self::Milestone { .. } | Self::Comeback { .. } => Urgency::Medium,
            _ => Urgency::Low,
        }
    }

    /// Message types this trigger may produce, best first.
    pub fn candidate_types(&self) -> &'static [MessageType] {
        match self {
            Self::StreakRisk { .. } => &[MessageType::StreakRiskWarning, MessageType::MotivationBoost],
            Self::Milestone { .. } => &[MessageType::MilestoneCelebration],
            Self::StrongProgress { .. } => &[MessageType::ProgressEncouragement],
            Self::Comeback { .. } => &[MessageType::ComebackSupport],
            Self::GoalOpportunity { .. } => &[MessageType::GoalSuggestion],
            Self::TimingInsight { .. } => &[MessageType::TimingOptimization],
            Self::GrowthChallenge { .. } => &[MessageType::GrowthChallenge],
            Self::Weekend { .. } => &[MessageType::WeekendMotivation],
            Self::Morning { .. } => &[MessageType::MorningMotivation],
            Self::Evening { .. } => &[MessageType::EveningReflection],
        }
    }

    /// Stable tag stored on messages for analytics.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::StreakRisk { .. } => "streak_risk",
            Self::Milestone { .. } => "milestone",
            Self::StrongProgress { .. } => "strong_progress",
            Self::Comeback { .. } => "comeback",
            Self::GoalOpportunity { .. } => "goal_opportunity",
            Self::TimingInsight { .. } => "timing_insight",
            Self::GrowthChallenge { .. } => "growth_challenge",
            Self::Weekend { .. } => "weekend",
            Self::Morning { .. } => "morning",
            Self::Evening { .. } => "evening",
        }
    }

    /// Payload flattened into template substitution keys.
    pub fn context(&self) -> HashMap<String, String> {
        let mut ctx = HashMap::new();
        let mut put = |k: &str, v: String| {
            ctx.insert(k.to_string(), v);
        };
        match self {
            Self::StreakRisk {
                risk_score,
                current_streak,
                hours_since_last_activity,
            } => {
                put("current_streak", current_streak.to_string());
                put("hours_since_last_activity", format!("{:.0}", hours_since_last_activity));
                put("risk_percent", format!("{:.0}", risk_score * 100.0));
            }
            Self::Milestone {
                streak_days,
                value_name,
            } => {
                put("milestone_days", streak_days.to_string());
                put(
                    "value_name",
                    value_name.clone().unwrap_or_else(|| "your habit".to_string()),
                );
            }
            Self::StrongProgress {
                formation_probability,
            } => put("formation_probability", format!("{:.0}", formation_probability)),
            Self::Comeback {
                gap_days,
                previous_streak,
            } => {
                put("gap_days", gap_days.to_string());
                put("previous_streak", previous_streak.to_string());
            }
            Self::GoalOpportunity {
                goal_title,
                rationale,
                ..
            } => {
                put("goal_title", goal_title.clone());
                put("goal_rationale", rationale.clone());
            }
            Self::TimingInsight {
                peak_hour,
                peak_day,
                ..
            } => {
                put("peak_hour", format_hour(*peak_hour));
                put("peak_day", peak_day.clone().unwrap_or_else(|| "any day".to_string()));
            }
            Self::GrowthChallenge {
                segment,
                activity_count,
            } => {
                put("user_segment", segment.label().to_string());
                put("activity_count", activity_count.to_string());
            }
            Self::Weekend { weekday } => put("weekday", weekday.clone()),
            Self::Morning { local_hour } | Self::Evening { local_hour } => {
                put("local_hour", local_hour.to_string())
            }
        }
        ctx
    }
}

/// Render an optional hour for message text.
pub fn format_hour(hour: Option<u8>) -> String {
    match hour {
        Some(h) => format!("{}:00", h),
        None => "your usual time".to_string(),
    }
}

/// Inputs for one user's analysis.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    /// Recent activities in any order.
    pub activities: &'a [ActivityRecord],
    pub values: &'a [ValueRecord],
    pub predictions: &'a PredictionBundle,
    pub now: DateTime<Utc>,
    pub tz: Tz,
}

/// Evaluates the trigger rules.
#[derive(Debug, Clone, Default)]
pub struct TriggerAnalyzer;

impl TriggerAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Run every rule and collect the triggers that fire.
    pub fn analyze(&self, input: &AnalysisInput<'_>) -> Vec<BehavioralTrigger> {
        let mut activities: Vec<&ActivityRecord> = input.activities.iter().collect();
        activities.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        let rules = [
            self.streak_risk(input),
            self.milestone(input, &activities),
            self.strong_progress(input),
            self.comeback(input, &activities),
            self.goal_opportunity(input),
            self.timing_insight(input),
            self.growth_challenge(input, activities.len()),
            self.weekend(input),
            self.time_of_day(input),
        ];
        rules.into_iter().flatten().collect()
    }

    fn streak_risk(&self, input: &AnalysisInput<'_>) -> Option<BehavioralTrigger> {
        let risk = &input.predictions.streak_risk;
        (risk.risk_level == RiskLevel::High).then(|| BehavioralTrigger::StreakRisk {
            risk_score: risk.risk_score,
            current_streak: risk.current_streak,
            hours_since_last_activity: risk.hours_since_last_activity,
        })
    }

    fn milestone(
        &self,
        input: &AnalysisInput<'_>,
        activities: &[&ActivityRecord],
    ) -> Option<BehavioralTrigger> {
        let today = input.now.with_timezone(&input.tz).date_naive();
        let mut days_by_value: HashMap<&str, BTreeSet<NaiveDate>> = HashMap::new();
        for activity in activities {
            if let Some(value_id) = activity.value_id.as_deref() {
                days_by_value
                    .entry(value_id)
                    .or_default()
                    .insert(activity.occurred_at.with_timezone(&input.tz).date_naive());
            }
        }

        let (value_id, streak) = days_by_value
            .iter()
            .filter_map(|(value_id, days)| active_run(days, today).map(|run| (*value_id, run)))
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))?;

        MILESTONES.contains(&streak).then(|| BehavioralTrigger::Milestone {
            streak_days: streak,
            value_name: input
                .values
                .iter()
                .find(|v| v.id == value_id)
                .map(|v| v.name.clone()),
        })
    }

    fn strong_progress(&self, input: &AnalysisInput<'_>) -> Option<BehavioralTrigger> {
        let probability = input.predictions.habit_formation.probability;
        (probability > 70.0).then_some(BehavioralTrigger::StrongProgress {
            formation_probability: probability,
        })
    }

    fn comeback(
        &self,
        input: &AnalysisInput<'_>,
        activities: &[&ActivityRecord],
    ) -> Option<BehavioralTrigger> {
        let latest = activities.first()?;
        if input.now - latest.occurred_at > Duration::hours(24) {
            return None;
        }

        let local_day = |a: &ActivityRecord| a.occurred_at.with_timezone(&input.tz).date_naive();
        let window = &activities[..activities.len().min(COMEBACK_LOOKBACK + 1)];
        let (gap_days, before) = window.windows(2).find_map(|pair| {
            let gap = (local_day(pair[0]) - local_day(pair[1])).num_days();
            (gap >= COMEBACK_GAP_DAYS).then(|| (gap, local_day(pair[1])))
        })?;

        let earlier_days: BTreeSet<NaiveDate> = activities
            .iter()
            .map(|a| local_day(*a))
            .filter(|d| *d <= before)
            .collect();
        Some(BehavioralTrigger::Comeback {
            gap_days,
            previous_streak: run_ending_at(&earlier_days, before),
        })
    }

    fn goal_opportunity(&self, input: &AnalysisInput<'_>) -> Option<BehavioralTrigger> {
        let top = input.predictions.goal_recommendations.iter().max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        let confidence = if top.confidence > 0.0 { top.confidence } else { 0.6 };
        Some(BehavioralTrigger::GoalOpportunity {
            goal_title: top.title.clone(),
            rationale: top.rationale.clone(),
            confidence,
        })
    }

    fn timing_insight(&self, input: &AnalysisInput<'_>) -> Option<BehavioralTrigger> {
        let timing = &input.predictions.optimal_timing;
        (timing.confidence > 60.0).then(|| BehavioralTrigger::TimingInsight {
            peak_hour: timing.peak_hour,
            peak_day: timing.peak_day.clone(),
            confidence: timing.confidence,
        })
    }

    fn growth_challenge(
        &self,
        input: &AnalysisInput<'_>,
        activity_count: usize,
    ) -> Option<BehavioralTrigger> {
        let segment = input.predictions.user_segment;
        (segment.is_advanced() && activity_count > GROWTH_ACTIVITY_THRESHOLD).then_some(
            BehavioralTrigger::GrowthChallenge {
                segment,
                activity_count,
            },
        )
    }

    fn weekend(&self, input: &AnalysisInput<'_>) -> Option<BehavioralTrigger> {
        let weekday = input.now.with_timezone(&input.tz).weekday();
        matches!(weekday, Weekday::Sat | Weekday::Sun).then(|| BehavioralTrigger::Weekend {
            weekday: weekday_name(weekday).to_string(),
        })
    }

    fn time_of_day(&self, input: &AnalysisInput<'_>) -> Option<BehavioralTrigger> {
        let local_hour = input.now.with_timezone(&input.tz).hour();
        match local_hour {
            6..=10 => Some(BehavioralTrigger::Morning { local_hour }),
            17..=21 => Some(BehavioralTrigger::Evening { local_hour }),
            _ => None,
        }
    }
}

/// Length of the run of consecutive days that ends today or yesterday.
fn active_run(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> Option<u32> {
    let end = if days.contains(&today) {
        today
    } else {
        let yesterday = today.pred_opt()?;
        if !days.contains(&yesterday) {
            return None;
        }
        yesterday
    };
    Some(run_ending_at(days, end))
}

/// Count consecutive days in `days` ending at `end`.
fn run_ending_at(days: &BTreeSet<NaiveDate>, end: NaiveDate) -> u32 {
    let mut run = 0;
    let mut cursor = Some(end);
    while let Some(day) = cursor {
        if !days.contains(&day) {
            break;
        }
        run += 1;
        cursor = day.pred_opt();
    }
    run
}

pub(crate) fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

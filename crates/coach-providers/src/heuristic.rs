//! Local predictor computing signals directly from activity history.
//!
//! No model is involved: streaks, weekly counts and the busiest hour are
//! counted, and simple thresholds map them to risk levels and segments.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc, Weekday};

use coach_core::error::CoachResult;
use coach_core::traits::Predictor;
use coach_core::types::{
    ActivityRecord, GoalRecommendation, HabitFormation, OptimalTiming, PredictionBundle, RiskLevel,
    StreakRisk, UserRecord, UserSegment, ValueRecord,
};

const HIGH_RISK_HOURS: f64 = 20.0;
const MEDIUM_RISK_HOURS: f64 = 12.0;
const AT_RISK_HOURS: f64 = 72.0;
const FORMATION_WINDOW_DAYS: i64 = 21;
const NEWCOMER_DAYS: i64 = 14;

/// Heuristic predictor. Timestamps are interpreted in UTC.
#[derive(Debug, Clone, Default)]
pub struct HeuristicPredictor;

impl HeuristicPredictor {
    pub fn new() -> Self {
        Self
    }

    /// Predictions as of `now`.
    pub fn predict_at(
        &self,
        user: &UserRecord,
        activities: &[ActivityRecord],
        values: &[ValueRecord],
        now: DateTime<Utc>,
    ) -> PredictionBundle {
        let days: BTreeSet<NaiveDate> = activities.iter().map(|a| a.occurred_at.date_naive()).collect();
        let last = activities.iter().map(|a| a.occurred_at).max();

        let streak = current_streak(&days, now.date_naive());
        let hours_since = last.map_or(0.0, |at| (now - at).num_minutes().max(0) as f64 / 60.0);
        let risk_level = if streak == 0 {
            RiskLevel::Low
        } else if hours_since >= HIGH_RISK_HOURS {
            RiskLevel::High
        } else if hours_since >= MEDIUM_RISK_HOURS {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
        let risk_score = if streak == 0 { 0.0 } else { (hours_since / 24.0).min(1.0) };

        let count_between = |from: i64, to: i64| {
            activities
                .iter()
                .filter(|a| {
                    let age = now - a.occurred_at;
                    age >= Duration::days(from) && age < Duration::days(to)
                })
                .count() as u32
        };
        let window_start = now.date_naive() - Duration::days(FORMATION_WINDOW_DAYS - 1);
        let active_days = days.range(window_start..).count() as f64;
        let probability = active_days / FORMATION_WINDOW_DAYS as f64 * 100.0;

        let segment = segment_for(user, activities.len(), hours_since, last.is_some(), now);

        PredictionBundle {
            streak_risk: StreakRisk {
                risk_level,
                risk_score,
                current_streak: streak,
                hours_since_last_activity: hours_since,
            },
            habit_formation: HabitFormation {
                probability,
                this_week_activities: count_between(0, 7),
                last_week_activities: count_between(7, 14),
            },
            optimal_timing: optimal_timing(activities),
            goal_recommendations: goal_recommendations(probability, values),
            user_segment: segment,
        }
        .sanitized()
    }
}

#[async_trait]
impl Predictor for HeuristicPredictor {
    async fn predict(
        &self,
        user: &UserRecord,
        activities: &[ActivityRecord],
        values: &[ValueRecord],
    ) -> CoachResult<PredictionBundle> {
        Ok(self.predict_at(user, activities, values, Utc::now()))
    }
}

fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut cursor = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };
    let mut streak = 0;
    while days.contains(&cursor) {
        streak += 1;
        match cursor.pred_opt() {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    streak
}

fn segment_for(
    user: &UserRecord,
    activity_count: usize,
    hours_since: f64,
    has_history: bool,
    now: DateTime<Utc>,
) -> UserSegment {
    if user.account_age_days(now) < NEWCOMER_DAYS {
        UserSegment::Newcomer
    } else if has_history && hours_since >= AT_RISK_HOURS {
        UserSegment::AtRisk
    } else {
        match activity_count {
            60.. => UserSegment::Champion,
            30..=59 => UserSegment::PowerUser,
            10..=29 => UserSegment::Regular,
            _ => UserSegment::Casual,
        }
    }
}

fn optimal_timing(activities: &[ActivityRecord]) -> OptimalTiming {
    if activities.is_empty() {
        return OptimalTiming::default();
    }
    let mut by_hour: HashMap<u32, usize> = HashMap::new();
    let mut by_day: HashMap<Weekday, usize> = HashMap::new();
    for activity in activities {
        *by_hour.entry(activity.occurred_at.hour()).or_default() += 1;
        *by_day.entry(activity.occurred_at.weekday()).or_default() += 1;
    }
    // Ties go to the earlier hour / day so results are stable.
    let (peak_hour, hour_count) = by_hour
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(h, c)| (*h, *c))
        .unwrap_or_default();
    let peak_day = by_day
        .iter()
        .max_by(|a, b| {
            a.1.cmp(b.1)
                .then_with(|| b.0.num_days_from_monday().cmp(&a.0.num_days_from_monday()))
        })
        .map(|(d, _)| day_name(*d).to_string());

    OptimalTiming {
        peak_hour: u8::try_from(peak_hour).ok(),
        peak_day,
        confidence: hour_count as f64 / activities.len() as f64 * 100.0,
    }
}

fn goal_recommendations(probability: f64, values: &[ValueRecord]) -> Vec<GoalRecommendation> {
    if probability < 70.0 {
        return Vec::new();
    }
    let title = match values.first() {
        Some(value) => format!("Go one step further with {}", value.name),
        None => "Add a second daily habit".to_string(),
    };
    vec![GoalRecommendation {
        title,
        rationale: "Your current routine is holding steady, so there is room to build on it.".to_string(),
        confidence: (probability / 100.0).min(0.9),
    }]
}

fn day_name(day: Weekday) -> &'static str {
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

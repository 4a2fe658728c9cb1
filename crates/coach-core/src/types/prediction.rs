//! Prediction bundle produced by the behavioral predictor.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Behavioral segment assigned by the predictor.
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
pub enum UserSegment {
    #[default]
    Newcomer,
    Casual,
    Regular,
    PowerUser,
    Champion,
    AtRisk,
}

impl UserSegment {
    /// Segments eligible for growth challenges.
    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::PowerUser | Self::Champion)
    }

    /// Human-readable label for message text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Newcomer => "newcomer",
            Self::Casual => "casual tracker",
            Self::Regular => "regular",
            Self::PowerUser => "power user",
            Self::Champion => "champion",
            Self::AtRisk => "returning user",
        }
    }
}

/// Streak-break risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakRisk {
    pub risk_level: RiskLevel,
    /// Probability in [0, 1] that the current streak breaks.
    pub risk_score: f64,
    pub current_streak: u32,
    pub hours_since_last_activity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HabitFormation {
    /// Probability in percent (0-100) that the habit sticks.
    pub probability: f64,
    pub this_week_activities: u32,
    pub last_week_activities: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimalTiming {
    pub peak_hour: Option<u8>,
    /// Weekday name, e.g. "Tuesday".
    pub peak_day: Option<String>,
    /// Confidence in percent (0-100).
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRecommendation {
    pub title: String,
    #[serde(default)]
    pub rationale: String,
    /// Confidence in [0, 1].
    #[serde(default)]
    pub confidence: f64,
}

/// Signals derived from a user's history by the external predictor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionBundle {
    pub streak_risk: StreakRisk,
    pub habit_formation: HabitFormation,
    pub optimal_timing: OptimalTiming,
    pub goal_recommendations: Vec<GoalRecommendation>,
    pub user_segment: UserSegment,
}

impl PredictionBundle {
    /// Clamp out-of-range values reported by the predictor.
    pub fn sanitized(mut self) -> Self {
        self.streak_risk.risk_score = self.streak_risk.risk_score.clamp(0.0, 1.0);
        self.streak_risk.hours_since_last_activity = self.streak_risk.hours_since_last_activity.max(0.0);
        self.habit_formation.probability = self.habit_formation.probability.clamp(0.0, 100.0);
        self.optimal_timing.confidence = self.optimal_timing.confidence.clamp(0.0, 100.0);
        self.optimal_timing.peak_hour = self.optimal_timing.peak_hour.filter(|h| *h < 24);
        for goal in &mut self.goal_recommendations {
            goal.confidence = goal.confidence.clamp(0.0, 1.0);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_deserializes_with_missing_sections() {
        let bundle: PredictionBundle =
            serde_json::from_str(r#"{"user_segment":"power_user"}"#).unwrap();
        assert_eq!(bundle.user_segment, UserSegment::PowerUser);
        assert!(bundle.user_segment.is_advanced());
        assert!(bundle.goal_recommendations.is_empty());
    }

    #[test]
    fn test_sanitized_clamps() {
        let mut bundle = PredictionBundle::default();
        bundle.streak_risk.risk_score = 3.0;
        bundle.habit_formation.probability = 140.0;
        bundle.optimal_timing.peak_hour = Some(30);
        let bundle = bundle.sanitized();
        assert_eq!(bundle.streak_risk.risk_score, 1.0);
        assert_eq!(bundle.habit_formation.probability, 100.0);
        assert_eq!(bundle.optimal_timing.peak_hour, None);
    }
}

//! Configuration for the coaching engine.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CoachError, CoachResult};
use crate::types::{FrequencyTier, MessageType, DISABLED_PREFERENCE};

/// Daily message cap per frequency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyCaps {
    pub minimal: u32,
    pub optimal: u32,
    pub frequent: u32,
    pub daily: u32,
}

impl Default for DailyCaps {
    fn default() -> Self {
        Self {
            minimal: 1,
            optimal: 3,
            frequent: 5,
            daily: 2,
        }
    }
}

impl DailyCaps {
    pub fn cap_for(&self, tier: FrequencyTier) -> u32 {
        match tier {
            FrequencyTier::Minimal => self.minimal,
            FrequencyTier::Optimal => self.optimal,
            FrequencyTier::Frequent => self.frequent,
            FrequencyTier::Daily => self.daily,
        }
    }
}

/// Frequency governor thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub daily_caps: DailyCaps,
    /// Minimum trigger confidence for ordinary types.
    pub min_confidence: f64,
    /// Minimum trigger confidence for high-stakes types.
    pub high_stakes_confidence: f64,
    /// Mean preference below this rejects the trigger.
    pub disabled_threshold: f64,
    /// Weight assumed for types the user never rated.
    pub default_preference: f64,
    /// Cooldown hours used when no active template of the type exists.
    pub cooldown_overrides: HashMap<MessageType, u32>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            daily_caps: DailyCaps::default(),
            min_confidence: 0.3,
            high_stakes_confidence: 0.7,
            disabled_threshold: DISABLED_PREFERENCE,
            default_preference: 0.5,
            cooldown_overrides: HashMap::new(),
        }
    }
}

impl GovernorConfig {
    /// Configured cooldown for a type, falling back to its built-in default.
    pub fn cooldown_hours(&self, message_type: MessageType) -> u32 {
        self.cooldown_overrides
            .get(&message_type)
            .copied()
            .unwrap_or_else(|| message_type.default_cooldown_hours())
    }
}

/// Message generation sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub batch_pause_ms: u64,
    /// How far back activity history is read.
    pub history_window_days: i64,
    /// Expiry for drafts composed from the fallback table.
    pub fallback_expiry_hours: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 10,
            batch_pause_ms: 1000,
            history_window_days: 60,
            fallback_expiry_hours: 24,
        }
    }
}

/// Delivery scheduling and batch delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub urgent_offset_minutes: i64,
    pub min_spacing_minutes: i64,
    pub lookahead_days: i64,
    /// Offset used when no slot is found within the lookahead.
    pub fallback_offset_minutes: i64,
    /// Default snooze length when the client gives none.
    pub default_snooze_minutes: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_pause_ms: 100,
            urgent_offset_minutes: 5,
            min_spacing_minutes: 30,
            lookahead_days: 7,
            fallback_offset_minutes: 60,
            default_snooze_minutes: 60,
        }
    }
}

/// Cadence and active-hour window of one orchestrated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub enabled: bool,
    pub interval_minutes: u64,
    /// First local hour the task may run in (inclusive).
    pub start_hour: u8,
    /// Last local hour the task may run in (inclusive).
    pub end_hour: u8,
}

impl TaskSchedule {
    pub const fn new(interval_minutes: u64, start_hour: u8, end_hour: u8) -> Self {
        Self {
            enabled: true,
            interval_minutes,
            start_hour,
            end_hour,
        }
    }

    /// Whether `hour` falls in the window. Windows may wrap midnight.
    pub fn allows_hour(&self, hour: u32) -> bool {
        let (start, end) = (u32::from(self.start_hour), u32::from(self.end_hour));
        if start <= end {
            (start..=end).contains(&hour)
        } else {
            hour >= start || hour <= end
        }
    }
}

/// Orchestrator cadences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Timezone the task windows are interpreted in.
    pub timezone: String,
    pub delivery: TaskSchedule,
    pub generation: TaskSchedule,
    pub analytics: TaskSchedule,
    pub cleanup: TaskSchedule,
    pub health: TaskSchedule,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            delivery: TaskSchedule::new(5, 6, 23),
            generation: TaskSchedule::new(120, 7, 22),
            analytics: TaskSchedule::new(24 * 60, 0, 23),
            cleanup: TaskSchedule::new(7 * 24 * 60, 0, 23),
            health: TaskSchedule::new(60, 0, 23),
        }
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }
}

/// Message retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub message_days: i64,
    pub acted_on_days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_days: 90,
            acted_on_days: 365,
        }
    }
}

/// Health check thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Pending messages older than this are reported as stuck.
    pub stuck_pending_hours: i64,
    pub queue_warning: usize,
    pub queue_critical: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stuck_pending_hours: 6,
            queue_warning: 1000,
            queue_critical: 5000,
        }
    }
}

/// Main engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub governor: GovernorConfig,
    pub generation: GenerationConfig,
    pub delivery: DeliveryConfig,
    pub schedule: ScheduleConfig,
    pub retention: RetentionConfig,
    pub health: HealthConfig,
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for CoachConfig {
    fn default() -> Self {
        let coach_dir = dirs::home_dir()
            .map(|h| h.join(".coach"))
            .unwrap_or_else(|| PathBuf::from(".coach"));

        Self {
            governor: GovernorConfig::default(),
            generation: GenerationConfig::default(),
            delivery: DeliveryConfig::default(),
            schedule: ScheduleConfig::default(),
            retention: RetentionConfig::default(),
            health: HealthConfig::default(),
            db_path: coach_dir.join("coach.db"),
        }
    }
}

impl CoachConfig {
    /// Load configuration from a file (TOML, JSON, or YAML) and validate it.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> CoachResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| CoachError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| CoachError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| CoachError::Configuration(e.to_string()))?,
            _ => {
                return Err(CoachError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `COACH_*` environment variables.
    pub fn from_env() -> CoachResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `COACH_*` environment variables on top of `self`.
    pub fn with_env_overrides(mut self) -> CoachResult<Self> {
        if let Ok(path) = std::env::var("COACH_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Ok(tz) = std::env::var("COACH_TIMEZONE") {
            self.schedule.timezone = tz;
        }
        if let Some(v) = env_parse("COACH_GENERATION_BATCH_SIZE")? {
            self.generation.batch_size = v;
        }
        if let Some(v) = env_parse("COACH_GENERATION_CONCURRENCY")? {
            self.generation.concurrency = v;
        }
        if let Some(v) = env_parse("COACH_DELIVERY_BATCH_SIZE")? {
            self.delivery.batch_size = v;
        }
        if let Some(v) = env_parse("COACH_DELIVERY_INTERVAL_MINUTES")? {
            self.schedule.delivery.interval_minutes = v;
        }
        if let Some(v) = env_parse("COACH_GENERATION_INTERVAL_MINUTES")? {
            self.schedule.generation.interval_minutes = v;
        }
        if let Some(v) = env_parse("COACH_RETENTION_DAYS")? {
            self.retention.message_days = v;
        }
        self.validate()?;
        Ok(self)
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> CoachConfigBuilder {
        CoachConfigBuilder::default()
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> CoachResult<()> {
        let caps = &self.governor.daily_caps;
        if [caps.minimal, caps.optimal, caps.frequent, caps.daily].contains(&0) {
            return Err(CoachError::Configuration(
                "daily caps must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("governor.min_confidence", self.governor.min_confidence),
            ("governor.high_stakes_confidence", self.governor.high_stakes_confidence),
            ("governor.disabled_threshold", self.governor.disabled_threshold),
            ("governor.default_preference", self.governor.default_preference),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoachError::Configuration(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.generation.batch_size == 0
            || self.generation.concurrency == 0
            || self.delivery.batch_size == 0
        {
            return Err(CoachError::Configuration(
                "batch sizes and concurrency must be greater than zero".to_string(),
            ));
        }
        if self.generation.history_window_days <= 0 || self.delivery.lookahead_days <= 0 {
            return Err(CoachError::Configuration(
                "history window and lookahead must be positive".to_string(),
            ));
        }
        if self.generation.fallback_expiry_hours == 0 {
            return Err(CoachError::Configuration(
                "fallback expiry must be at least one hour".to_string(),
            ));
        }
        if self.schedule.timezone.parse::<Tz>().is_err() {
            return Err(CoachError::Configuration(format!(
                "unknown timezone '{}'",
                self.schedule.timezone
            )));
        }
        for (name, task) in [
            ("delivery", &self.schedule.delivery),
            ("generation", &self.schedule.generation),
            ("analytics", &self.schedule.analytics),
            ("cleanup", &self.schedule.cleanup),
            ("health", &self.schedule.health),
        ] {
            if task.start_hour > 23 || task.end_hour > 23 {
                return Err(CoachError::Configuration(format!(
                    "schedule.{name} hours must be in 0..=23"
                )));
            }
            if task.interval_minutes == 0 {
                return Err(CoachError::Configuration(format!(
                    "schedule.{name}.interval_minutes must be greater than zero"
                )));
            }
        }
        if self.retention.message_days <= 0 || self.retention.acted_on_days < self.retention.message_days {
            return Err(CoachError::Configuration(
                "retention days must be positive and acted_on_days >= message_days".to_string(),
            ));
        }
        if self.health.queue_warning > self.health.queue_critical {
            return Err(CoachError::Configuration(
                "health.queue_warning must not exceed health.queue_critical".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> CoachResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CoachError::Configuration(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Builder for CoachConfig.
#[derive(Default)]
pub struct CoachConfigBuilder {
    config: CoachConfig,
}

impl CoachConfigBuilder {
    pub fn governor(mut self, config: GovernorConfig) -> Self {
        self.config.governor = config;
        self
    }

    pub fn generation(mut self, config: GenerationConfig) -> Self {
        self.config.generation = config;
        self
    }

    pub fn delivery(mut self, config: DeliveryConfig) -> Self {
        self.config.delivery = config;
        self
    }

    pub fn schedule(mut self, config: ScheduleConfig) -> Self {
        self.config.schedule = config;
        self
    }

    pub fn retention(mut self, config: RetentionConfig) -> Self {
        self.config.retention = config;
        self
    }

    pub fn health(mut self, config: HealthConfig) -> Self {
        self.config.health = config;
        self
    }

    /// Set the database path.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> CoachResult<CoachConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CoachConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.governor.daily_caps.cap_for(FrequencyTier::Minimal), 1);
        assert_eq!(config.governor.daily_caps.cap_for(FrequencyTier::Daily), 2);
        assert_eq!(config.governor.disabled_threshold, DISABLED_PREFERENCE);
    }

    #[test]
    fn test_cooldown_override() {
        let mut governor = GovernorConfig::default();
        assert_eq!(governor.cooldown_hours(MessageType::StreakRiskWarning), 12);
        governor.cooldown_overrides.insert(MessageType::StreakRiskWarning, 4);
        assert_eq!(governor.cooldown_hours(MessageType::StreakRiskWarning), 4);
    }

    #[test]
    fn test_task_window_wraps_midnight() {
        let window = TaskSchedule::new(60, 22, 2);
        assert!(window.allows_hour(23));
        assert!(window.allows_hour(1));
        assert!(!window.allows_hour(12));
        assert!(TaskSchedule::new(5, 6, 23).allows_hour(23));
        assert!(!TaskSchedule::new(5, 6, 23).allows_hour(5));
    }

    #[test]
    fn test_builder_rejects_zero_cap() {
        let governor = GovernorConfig {
            daily_caps: DailyCaps {
                minimal: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(CoachConfig::builder().governor(governor).build().is_err());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let schedule = ScheduleConfig {
            timezone: "Nowhere/Special".to_string(),
            ..Default::default()
        };
        assert!(CoachConfig::builder().schedule(schedule).build().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[governor.daily_caps]
optimal = 4

[governor.cooldown_overrides]
goal_suggestion = 96

[delivery]
min_spacing_minutes = 45
"#
        )
        .unwrap();
        let config = CoachConfig::from_file(file.path()).unwrap();
        assert_eq!(config.governor.daily_caps.optimal, 4);
        assert_eq!(config.governor.daily_caps.minimal, 1);
        assert_eq!(config.governor.cooldown_hours(MessageType::GoalSuggestion), 96);
        assert_eq!(config.delivery.min_spacing_minutes, 45);
    }

    #[test]
    fn test_from_file_rejects_unknown_message_type_key() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"governor": {{"cooldown_overrides": {{"spam_blast": 1}}}}}}"#).unwrap();
        assert!(CoachConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(CoachConfig::from_file(file.path()).is_err());
    }
}

//! Coaching pipeline: trigger analysis, governance, composition, scheduling
//! and delivery.

mod catalog;
mod composer;
mod delivery;
mod delivery_time;
mod engine;
mod governor;
mod stats;
mod triggers;

pub use catalog::default_templates;
pub use composer::{priority_for, ComposeContext, MessageComposer};
pub use delivery::{BatchDeliveryEngine, DeliveryReport};
pub use delivery_time::DeliveryScheduler;
pub use engine::{
    CoachingEngine, GenerationOutcome, GenerationReport, HealthSnapshot, HealthStatus,
    ListMessages, RetentionReport, UserInsights, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use governor::{CycleState, FrequencyGovernor, GovernorDecision, Rejection};
pub use stats::{EngineStats, StatsSnapshot, TaskRun};
pub use triggers::{format_hour, AnalysisInput, BehavioralTrigger, TriggerAnalyzer, Urgency};

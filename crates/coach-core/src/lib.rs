//! coach-core - Core library for the coaching message engine.
//!
//! This crate provides the types, traits, storage and engine that decide
//! whether, what and when to send behavior-triggered coaching messages.
//!
//! # Example
//!
//! ```ignore
//! use coach_core::{CoachConfig, CoachingEngine, SqliteCoachStore};
//!
//! let config = CoachConfig::from_env()?;
//! let store = Arc::new(SqliteCoachStore::new(&config.db_path)?);
//! let engine = CoachingEngine::new(config, store.clone(), store, predictor, notifier);
//! engine.seed_default_templates()?;
//!
//! // Generate drafts for one user
//! let outcome = engine.generate_for_user("user-1").await?;
//!
//! // Deliver whatever is due
//! let report = engine.deliver_due().await?;
//! ```

pub mod coaching;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod store;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use coaching::{
    BehavioralTrigger, CoachingEngine, DeliveryReport, GenerationOutcome, GenerationReport,
    HealthSnapshot, HealthStatus, ListMessages, UserInsights,
};
pub use config::CoachConfig;
pub use error::{CoachError, CoachResult, ErrorCode};
pub use orchestrator::{OrchestratedTask, Orchestrator};
pub use store::SqliteCoachStore;
pub use traits::{ActivitySource, CoachStore, Notification, Notifier, Predictor};
pub use types::{
    CoachingMessage, InteractionType, MessagePriority, MessageStatus, MessageTemplate,
    MessageType, PersonalizationProfile, PredictionBundle, ProfileUpdate,
};

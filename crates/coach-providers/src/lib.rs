//! coach-providers - Notifier and predictor implementations for the coaching engine.
//!
//! # Supported Providers
//!
//! - **Log** notifier - writes notifications to the tracing log
//! - **Webhook** notifier - signed JSON POST to an HTTP endpoint
//! - **Heuristic** predictor - counts streaks and weekly activity locally
//! - **HTTP** predictor - calls a remote prediction service with retries
//!
//! # Example
//!
//! ```ignore
//! use coach_providers::{NotifierFactory, PredictorFactory};
//!
//! let notifier = NotifierFactory::webhook("https://hooks.example.com/coach")?;
//! let predictor = PredictorFactory::heuristic();
//! ```

mod factory;
mod heuristic;
mod http_predictor;
mod log;
mod webhook;

pub use factory::{parse_provider, NotifierFactory, NotifierProvider, PredictorFactory, PredictorProvider};
pub use heuristic::HeuristicPredictor;
pub use http_predictor::HttpPredictor;
pub use log::LogNotifier;
pub use webhook::{sign_payload, verify_signature, WebhookNotifier, SIGNATURE_HEADER};

// Re-export core types for convenience
pub use coach_core::traits::{Notification, Notifier, NotifierConfig, Predictor, PredictorConfig};

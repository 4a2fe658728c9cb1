//! Behavioral predictor trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoachResult;
use crate::types::{ActivityRecord, PredictionBundle, UserRecord, ValueRecord};

/// Source of per-user behavioral predictions.
///
/// Implementations may call a remote model service or compute heuristics
/// locally. Values outside their documented ranges are clamped by the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Produce predictions from the user's record and recent history.
    async fn predict(
        &self,
        user: &UserRecord,
        activities: &[ActivityRecord],
        values: &[ValueRecord],
    ) -> CoachResult<PredictionBundle>;
}

/// Predictor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Endpoint of a remote prediction service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Bearer token for the remote service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries on transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> usize {
    2
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

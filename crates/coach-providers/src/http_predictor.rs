//! Remote prediction service client.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::warn;
use url::Url;

use coach_core::error::{CoachError, CoachResult, ErrorCode};
use coach_core::traits::{Predictor, PredictorConfig};
use coach_core::types::{ActivityRecord, PredictionBundle, UserRecord, ValueRecord};

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    user: &'a UserRecord,
    activities: &'a [ActivityRecord],
    values: &'a [ValueRecord],
}

/// Calls `POST {base_url}/predict` and retries transient failures.
pub struct HttpPredictor {
    client: Client,
    endpoint: Url,
    api_key: Option<SecretString>,
    max_retries: usize,
}

impl HttpPredictor {
    pub fn new(config: PredictorConfig) -> CoachResult<Self> {
        let base_url = config
            .base_url
            .or_else(|| std::env::var("COACH_PREDICTOR_URL").ok())
            .ok_or_else(|| {
                CoachError::Configuration(
                    "Predictor URL not found. Set COACH_PREDICTOR_URL or provide base_url in config."
                        .to_string(),
                )
            })?;
        let endpoint = Url::parse(&base_url)
            .and_then(|base| base.join("predict"))
            .map_err(|e| CoachError::Configuration(format!("Invalid predictor URL '{}': {}", base_url, e)))?;
        let api_key = config
            .api_key
            .or_else(|| std::env::var("COACH_PREDICTOR_API_KEY").ok())
            .map(SecretString::new);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CoachError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call_once(&self, request: &PredictRequest<'_>) -> CoachResult<PredictionBundle> {
        let mut builder = self.client.post(self.endpoint.clone()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CoachError::api(format!("Predictor request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CoachError::api(format!("Failed to read predictor response: {}", e)))?;

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoachError::api(format!("Predictor error ({}): {}", status, body)));
        }
        if !status.is_success() {
            return Err(CoachError::Prediction {
                message: format!("Predictor rejected request ({}): {}", status, body),
                code: ErrorCode::PredUnavailable,
                source: None,
            });
        }

        serde_json::from_str(&body).map_err(|e| CoachError::Prediction {
            message: format!("Failed to parse predictor response: {}", e),
            code: ErrorCode::PredInvalidResponse,
            source: Some(Box::new(e)),
        })
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(
        &self,
        user: &UserRecord,
        activities: &[ActivityRecord],
        values: &[ValueRecord],
    ) -> CoachResult<PredictionBundle> {
        let request = PredictRequest {
            user,
            activities,
            values,
        };
        (|| self.call_once(&request))
            .retry(
                ExponentialBuilder::default()
                    .with_max_times(self.max_retries)
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_delay(Duration::from_secs(5)),
            )
            .when(|e| matches!(e, CoachError::Network { .. }))
            .notify(|err, dur| {
                warn!(user_id = %user.id, error = %err, retry_in = ?dur, "Predictor call failed, retrying");
            })
            .await
    }
}

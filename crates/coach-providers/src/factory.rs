//! Factories for notifiers and predictors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use coach_core::error::{CoachError, CoachResult};
use coach_core::traits::{Notifier, NotifierConfig, Predictor, PredictorConfig};

use crate::heuristic::HeuristicPredictor;
use crate::http_predictor::HttpPredictor;
use crate::log::LogNotifier;
use crate::webhook::WebhookNotifier;

/// Notification transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum NotifierProvider {
    #[default]
    Log,
    Webhook,
}

/// Prediction sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum PredictorProvider {
    #[default]
    Heuristic,
    Http,
}

/// Parse a provider name, mapping unknown names to an unsupported-provider error.
pub fn parse_provider<P: std::str::FromStr>(name: &str) -> CoachResult<P> {
    name.parse().map_err(|_| CoachError::UnsupportedProvider {
        provider: name.to_string(),
    })
}

/// Factory for creating notifiers.
pub struct NotifierFactory;

impl NotifierFactory {
    pub fn create(provider: NotifierProvider, config: NotifierConfig) -> CoachResult<Arc<dyn Notifier>> {
        match provider {
            NotifierProvider::Log => Ok(Arc::new(LogNotifier::new())),
            NotifierProvider::Webhook => Ok(Arc::new(WebhookNotifier::new(config)?)),
        }
    }

    pub fn log() -> Arc<dyn Notifier> {
        Arc::new(LogNotifier::new())
    }

    pub fn webhook(url: impl Into<String>) -> CoachResult<Arc<dyn Notifier>> {
        Self::create(
            NotifierProvider::Webhook,
            NotifierConfig {
                url: Some(url.into()),
                ..Default::default()
            },
        )
    }
}

/// Factory for creating predictors.
pub struct PredictorFactory;

impl PredictorFactory {
    pub fn create(provider: PredictorProvider, config: PredictorConfig) -> CoachResult<Arc<dyn Predictor>> {
        match provider {
            PredictorProvider::Heuristic => Ok(Arc::new(HeuristicPredictor::new())),
            PredictorProvider::Http => Ok(Arc::new(HttpPredictor::new(config)?)),
        }
    }

    pub fn heuristic() -> Arc<dyn Predictor> {
        Arc::new(HeuristicPredictor::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_names() {
        let notifier: NotifierProvider = parse_provider("Webhook").unwrap();
        assert_eq!(notifier, NotifierProvider::Webhook);
        let predictor: PredictorProvider = parse_provider("http").unwrap();
        assert_eq!(predictor, PredictorProvider::Http);
        assert_eq!(NotifierProvider::Log.to_string(), "log");
    }

    #[test]
    fn test_unknown_provider_is_unsupported() {
        let err = parse_provider::<NotifierProvider>("carrier-pigeon").unwrap_err();
        assert!(matches!(err, CoachError::UnsupportedProvider { .. }));
    }

    #[test]
    fn test_webhook_without_url_fails() {
        std::env::remove_var("COACH_WEBHOOK_URL");
        let result = NotifierFactory::create(NotifierProvider::Webhook, NotifierConfig::default());
        assert!(matches!(result, Err(CoachError::Configuration(_))));
    }
}

//! Factory for creating the coaching engine from configuration.

use std::sync::Arc;

use coach_core::error::CoachResult;
use coach_core::traits::{Notifier, NotifierConfig, Predictor, PredictorConfig};
use coach_core::{CoachConfig, CoachingEngine, SqliteCoachStore};
use coach_providers::{
    parse_provider, NotifierFactory, NotifierProvider, PredictorFactory, PredictorProvider,
};
use tracing::info;

/// Load configuration from `COACH_CONFIG` if set, otherwise from the environment.
pub fn load_config() -> CoachResult<CoachConfig> {
    match std::env::var("COACH_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            CoachConfig::from_file(&path)?.with_env_overrides()
        }
        Err(_) => CoachConfig::from_env(),
    }
}

/// Create an engine backed by the SQLite store at `config.db_path`.
///
/// The same store serves as the activity source.
pub fn create_engine(config: CoachConfig) -> CoachResult<CoachingEngine> {
    let store = Arc::new(SqliteCoachStore::new(&config.db_path)?);
    info!(db_path = %config.db_path.display(), "Opened coaching store");

    let predictor = create_predictor()?;
    let notifier = create_notifier()?;

    Ok(CoachingEngine::new(
        config,
        store.clone(),
        store,
        predictor,
        notifier,
    ))
}

/// Notifier named by `COACH_NOTIFIER` (`log` when unset).
pub fn create_notifier() -> CoachResult<Arc<dyn Notifier>> {
    let provider = match std::env::var("COACH_NOTIFIER") {
        Ok(name) => parse_provider(&name)?,
        Err(_) => NotifierProvider::default(),
    };
    info!(provider = %provider, "Creating notifier");
    NotifierFactory::create(provider, NotifierConfig::default())
}

/// Predictor named by `COACH_PREDICTOR` (`heuristic` when unset).
pub fn create_predictor() -> CoachResult<Arc<dyn Predictor>> {
    let provider = match std::env::var("COACH_PREDICTOR") {
        Ok(name) => parse_provider(&name)?,
        Err(_) => PredictorProvider::default(),
    };
    info!(provider = %provider, "Creating predictor");
    PredictorFactory::create(provider, PredictorConfig::default())
}

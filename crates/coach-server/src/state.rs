//! Server state management.

use std::sync::Arc;

use coach_core::CoachingEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CoachingEngine>,
}

impl AppState {
    pub fn new(engine: Arc<CoachingEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &CoachingEngine {
        &self.engine
    }
}

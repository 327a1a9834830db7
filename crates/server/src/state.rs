//! Application state shared across handlers.

use std::sync::Arc;
use stevedore_core::config::AppConfig;
use stevedore_storage::Registry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,

    /// The registry namespace.
    pub registry: Arc<Registry>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: AppConfig, registry: Arc<Registry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
        }
    }
}

//! Application state for the web service.

use std::sync::Arc;

use common::config::AppConfig;
use handlers::HandlerManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub manager: Arc<HandlerManager>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig, manager: HandlerManager) -> Self {
        Self {
            config,
            manager: Arc::new(manager),
        }
    }

    /// Service name reported in response metadata.
    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

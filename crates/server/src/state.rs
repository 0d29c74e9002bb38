//! Application state shared across handlers.

use crate::finalize::FinalizeHandle;
use depot_core::config::AppConfig;
use depot_storage::{PropsStore, StagingArea};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Staging tree for in-flight deposits.
    pub staging: Arc<StagingArea>,
    /// Deposit state records.
    pub props: Arc<PropsStore>,
    /// Handle onto the finalization queue.
    pub finalizer: FinalizeHandle,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid. The binary validates before
    /// construction, so this only trips on misuse.
    pub fn new(
        config: AppConfig,
        staging: Arc<StagingArea>,
        props: Arc<PropsStore>,
        finalizer: FinalizeHandle,
    ) -> Self {
        if let Err(error) = config.validate() {
            panic!("invalid configuration: {error}");
        }
        Self {
            config: Arc::new(config),
            staging,
            props,
            finalizer,
        }
    }
}

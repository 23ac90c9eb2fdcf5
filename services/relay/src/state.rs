//! Shared Application State
//!
//! Everything here is read-only after startup and shared by reference across
//! all sessions.

use crate::{
    catalog::{CatalogError, HttpModelLister, ModelCatalog},
    config::Config,
    credentials::{CredentialSource, StaticCredentials},
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credentials: Arc<dyn CredentialSource>,
    pub catalog: Arc<ModelCatalog>,
    pub system_prompt: Arc<String>,
}

impl AppState {
    /// Wires the environment-backed credential source and the HTTP model catalog.
    pub fn new(config: Config, system_prompt: String) -> Result<Self, CatalogError> {
        let credentials: Arc<dyn CredentialSource> =
            Arc::new(StaticCredentials::from_config(&config));
        let lister = HttpModelLister::new(config.models_endpoint.clone(), credentials.clone())?;
        let catalog = Arc::new(ModelCatalog::new(Arc::new(lister), config.model_cache_ttl));
        Ok(Self {
            config: Arc::new(config),
            credentials,
            catalog,
            system_prompt: Arc::new(system_prompt),
        })
    }
}

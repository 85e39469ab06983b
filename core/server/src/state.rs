//! Shared handler state.

use std::sync::Arc;
use tracing::info;

use campussync_common::Result;
use campussync_storage::create_default_registry;
use campussync_sync::{SchemaRegistry, SyncEngine};

use crate::auth::TokenTable;
use crate::config::ServiceConfig;

/// State cloned into every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Sync engine.
    pub engine: Arc<SyncEngine>,
    /// Accepted tokens.
    pub tokens: Arc<TokenTable>,
}

impl AppState {
    /// Wrap an engine and token table.
    pub fn new(engine: SyncEngine, tokens: TokenTable) -> Self {
        Self {
            engine: Arc::new(engine),
            tokens: Arc::new(tokens),
        }
    }

    /// Build the engine and token table described by `config`.
    ///
    /// # Errors
    /// - Unknown store backend
    /// - Backend failed to open
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let registry = create_default_registry()?;
        let stores = registry.resolve(&config.store.backend, config.store.options.clone())?;
        info!(
            "Using store backend '{}' (documents: {}, media: {})",
            config.store.backend,
            stores.documents.name(),
            stores.media.name()
        );

        let engine = SyncEngine::new(
            stores,
            Arc::new(SchemaRegistry::standard()),
            config.sync.clone(),
        );
        Ok(Self::new(engine, TokenTable::from_config(&config.server)))
    }
}

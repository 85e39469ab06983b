//! Backend registry for resolving stores from configuration.

use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use campussync_common::{Error, Result};

use crate::http_media::HttpMediaStore;
use crate::local::LocalStore;
use crate::memory::{MemoryDocumentStore, MemoryMediaStore, MemoryTaxonomyStore};
use crate::provider::{DocumentStore, MediaStore, TaxonomyStore};

/// The three collaborators the sync engine needs, resolved together.
#[derive(Clone)]
pub struct StoreBundle {
    /// Entity persistence.
    pub documents: Arc<dyn DocumentStore>,
    /// Asset registry.
    pub media: Arc<dyn MediaStore>,
    /// Term registry and assignment.
    pub taxonomy: Arc<dyn TaxonomyStore>,
}

impl StoreBundle {
    /// Fresh in-memory bundle.
    pub fn memory() -> Self {
        Self {
            documents: Arc::new(MemoryDocumentStore::new()),
            media: Arc::new(MemoryMediaStore::new()),
            taxonomy: Arc::new(MemoryTaxonomyStore::new()),
        }
    }
}

/// Factory function type for creating store bundles.
pub type StoreFactory = Box<dyn Fn(Value) -> Result<StoreBundle> + Send + Sync>;

/// Registry for store backend factories.
pub struct StoreRegistry {
    factories: HashMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: StoreFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a backend by name and options.
    ///
    /// # Errors
    /// - Backend not found
    /// - Options invalid for the backend
    pub fn resolve(&self, name: &str, options: Value) -> Result<StoreBundle> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Backend '{}' is not registered", name)))?;
        factory(options)
    }

    /// Registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a local backend from its options.
///
/// Recognized options: `root` (required), `media_root` (defaults to
/// `<root>/media`) and `public_base_url` (defaults to `/media`).
fn local_bundle(options: Value) -> Result<StoreBundle> {
    let root = options
        .get("root")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidInput("Local backend requires 'root' path".to_string()))?;
    let root = PathBuf::from(root);

    let media_root = options
        .get("media_root")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join("media"));
    let public_base_url = options
        .get("public_base_url")
        .and_then(Value::as_str)
        .unwrap_or("/media");

    let store = Arc::new(LocalStore::open(&root)?);
    Ok(StoreBundle {
        documents: store.clone(),
        media: Arc::new(HttpMediaStore::open(media_root, public_base_url)?),
        taxonomy: store,
    })
}

/// Create a registry with the built-in backends.
///
/// # Errors
/// - A built-in name collides (only possible if registration is changed)
pub fn create_default_registry() -> Result<StoreRegistry> {
    let mut registry = StoreRegistry::new();
    registry.register("memory", Box::new(|_options| Ok(StoreBundle::memory())))?;
    registry.register("local", Box::new(local_bundle))?;
    Ok(registry)
}

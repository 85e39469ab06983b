//! Local filesystem store.
//!
//! Keeps documents and taxonomy terms in memory and writes a JSON snapshot
//! to `<root>/state.json` after every mutation.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use campussync_common::{AssetId, EntityId, EntityType, Error, Result, Slug, TermId};

use crate::provider::{Document, DocumentDraft, DocumentStore, ListQuery, Page, TaxonomyStore, Term};
use crate::table::{DocumentTable, TermTable};

/// Snapshot file name in the store root.
pub const STATE_FILENAME: &str = "state.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    documents: DocumentTable,
    terms: TermTable,
}

/// Document and taxonomy store persisted to a local directory.
pub struct LocalStore {
    root: PathBuf,
    state: RwLock<Snapshot>,
}

impl LocalStore {
    /// Open (or initialize) a store rooted at `root`.
    ///
    /// # Postconditions
    /// - Root directory exists
    /// - Previously persisted state is loaded
    ///
    /// # Errors
    /// - Permission denied
    /// - Snapshot exists but cannot be parsed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Sync I/O is fine here; this only runs at startup.
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        let state_path = root.join(STATE_FILENAME);
        let snapshot = if state_path.exists() {
            let content = std::fs::read_to_string(&state_path)?;
            serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))?
        } else {
            Snapshot::default()
        };

        Ok(Self {
            root,
            state: RwLock::new(snapshot),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(snapshot).map_err(|e| Error::Serialization(e.to_string()))?;

        let target = self.root.join(STATE_FILENAME);
        let temp = self.root.join(format!("{}.tmp", STATE_FILENAME));
        fs::write(&temp, &json).await?;
        fs::rename(&temp, &target).await?;

        debug!("Persisted store snapshot ({} bytes)", json.len());
        Ok(())
    }

    /// Apply `op` to a copy of the document table and swap it in once the
    /// snapshot is on disk. A failed `op` or persist leaves the live state
    /// untouched.
    async fn mutate_documents<T>(
        &self,
        op: impl FnOnce(&mut DocumentTable) -> Result<T> + Send,
    ) -> Result<T> {
        let mut state = self.state.write().await;
        let mut documents = state.documents.clone();
        let result = op(&mut documents)?;

        let previous = std::mem::replace(&mut state.documents, documents);
        if let Err(e) = self.persist(&state).await {
            state.documents = previous;
            return Err(e);
        }
        Ok(result)
    }

    async fn mutate_terms<T>(&self, op: impl FnOnce(&mut TermTable) -> Result<T> + Send) -> Result<T> {
        let mut state = self.state.write().await;
        let mut terms = state.terms.clone();
        let result = op(&mut terms)?;

        let previous = std::mem::replace(&mut state.terms, terms);
        if let Err(e) = self.persist(&state).await {
            state.terms = previous;
            return Err(e);
        }
        Ok(result)
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn find_by_slug(&self, entity_type: EntityType, slug: &Slug) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state.documents.find_by_slug(entity_type, slug).cloned())
    }

    async fn get(&self, id: EntityId) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state.documents.get(id).cloned())
    }

    async fn create(&self, draft: DocumentDraft) -> Result<Document> {
        self.mutate_documents(|t| t.create(draft, Utc::now())).await
    }

    async fn update(&self, id: EntityId, draft: DocumentDraft) -> Result<Document> {
        self.mutate_documents(|t| t.update(id, draft, Utc::now())).await
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        self.mutate_documents(|t| t.delete(id)).await
    }

    async fn get_attribute(&self, id: EntityId, key: &str) -> Result<Option<Value>> {
        let state = self.state.read().await;
        state.documents.get_attribute(id, key)
    }

    async fn set_attribute(&self, id: EntityId, key: &str, value: Value) -> Result<()> {
        self.mutate_documents(|t| t.set_attribute(id, key, value)).await
    }

    async fn delete_attribute(&self, id: EntityId, key: &str) -> Result<()> {
        self.mutate_documents(|t| t.delete_attribute(id, key)).await
    }

    async fn set_featured_media(&self, id: EntityId, asset: Option<AssetId>) -> Result<()> {
        self.mutate_documents(|t| t.set_featured_media(id, asset)).await
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<Document>> {
        let state = self.state.read().await;
        Ok(state.documents.list(query))
    }
}

#[async_trait]
impl TaxonomyStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn find_by_slug(&self, taxonomy: &str, slug: &str) -> Result<Option<Term>> {
        let state = self.state.read().await;
        Ok(state.terms.find_by_slug(taxonomy, slug))
    }

    async fn find_by_name(&self, taxonomy: &str, name: &str) -> Result<Option<Term>> {
        let state = self.state.read().await;
        Ok(state.terms.find_by_name(taxonomy, name))
    }

    async fn create(&self, taxonomy: &str, name: &str) -> Result<Term> {
        self.mutate_terms(|t| t.create(taxonomy, name)).await
    }

    async fn assign(&self, taxonomy: &str, entity: EntityId, terms: &[TermId]) -> Result<()> {
        self.mutate_terms(|t| {
            t.assign(taxonomy, entity, terms);
            Ok(())
        })
        .await
    }

    async fn assigned(&self, taxonomy: &str, entity: EntityId) -> Result<Vec<Term>> {
        let state = self.state.read().await;
        Ok(state.terms.assigned(taxonomy, entity))
    }
}

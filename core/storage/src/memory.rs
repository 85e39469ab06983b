//! In-memory stores for testing.
//!
//! Every mutation is counted so tests can assert that an operation had no
//! side effects.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use campussync_common::{AssetId, EntityId, EntityType, Error, Result, Slug, TermId};

use crate::provider::{
    Document, DocumentDraft, DocumentStore, ListQuery, MediaStore, Page, TaxonomyStore, Term,
};
use crate::table::{DocumentTable, TermTable};

fn poisoned<T>(_: T) -> Error {
    Error::Storage("Store lock poisoned".to_string())
}

/// In-memory document store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop.
pub struct MemoryDocumentStore {
    table: RwLock<DocumentTable>,
    mutations: AtomicU64,
}

impl MemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(DocumentTable::default()),
            mutations: AtomicU64::new(0),
        }
    }

    /// Number of successful mutating calls made so far.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Check if the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut DocumentTable) -> Result<T>) -> Result<T> {
        let mut table = self.table.write().map_err(poisoned)?;
        let result = op(&mut table)?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_by_slug(&self, entity_type: EntityType, slug: &Slug) -> Result<Option<Document>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.find_by_slug(entity_type, slug).cloned())
    }

    async fn get(&self, id: EntityId) -> Result<Option<Document>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.get(id).cloned())
    }

    async fn create(&self, draft: DocumentDraft) -> Result<Document> {
        self.mutate(|t| t.create(draft, Utc::now()))
    }

    async fn update(&self, id: EntityId, draft: DocumentDraft) -> Result<Document> {
        self.mutate(|t| t.update(id, draft, Utc::now()))
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        self.mutate(|t| t.delete(id))
    }

    async fn get_attribute(&self, id: EntityId, key: &str) -> Result<Option<Value>> {
        let table = self.table.read().map_err(poisoned)?;
        table.get_attribute(id, key)
    }

    async fn set_attribute(&self, id: EntityId, key: &str, value: Value) -> Result<()> {
        self.mutate(|t| t.set_attribute(id, key, value))
    }

    async fn delete_attribute(&self, id: EntityId, key: &str) -> Result<()> {
        self.mutate(|t| t.delete_attribute(id, key))
    }

    async fn set_featured_media(&self, id: EntityId, asset: Option<AssetId>) -> Result<()> {
        self.mutate(|t| t.set_featured_media(id, asset))
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<Document>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.list(query))
    }
}

/// In-memory media store.
///
/// Nothing is downloaded: the source URL is registered as-is and doubles
/// as the public URL. URLs marked with [`MemoryMediaStore::reject`] fail
/// the way an unreachable host would.
pub struct MemoryMediaStore {
    state: RwLock<MediaState>,
}

#[derive(Default)]
struct MediaState {
    next_id: u64,
    assets: HashMap<AssetId, String>,
    rejected: HashSet<String>,
}

impl MemoryMediaStore {
    /// Create a new empty media store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MediaState {
                next_id: 1,
                ..MediaState::default()
            }),
        }
    }

    /// Make future sideloads of `url` fail.
    pub fn reject(&self, url: impl Into<String>) {
        if let Ok(mut state) = self.state.write() {
            state.rejected.insert(url.into());
        }
    }

    /// Number of registered assets.
    pub fn asset_count(&self) -> usize {
        self.state.read().map(|s| s.assets.len()).unwrap_or(0)
    }
}

impl Default for MemoryMediaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn sideload(&self, url: &str, _owner: EntityId) -> Result<AssetId> {
        let mut state = self.state.write().map_err(poisoned)?;
        if state.rejected.contains(url) {
            return Err(Error::Network(format!("Download failed for {}", url)));
        }

        let id = AssetId::new(state.next_id)
            .ok_or_else(|| Error::Storage("Identifier space exhausted".to_string()))?;
        state.next_id += 1;
        state.assets.insert(id, url.to_string());

        Ok(id)
    }

    async fn url(&self, id: AssetId) -> Result<Option<String>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.assets.get(&id).cloned())
    }
}

/// In-memory taxonomy store.
pub struct MemoryTaxonomyStore {
    table: RwLock<TermTable>,
}

impl MemoryTaxonomyStore {
    /// Create a new empty taxonomy store.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(TermTable::default()),
        }
    }
}

impl Default for MemoryTaxonomyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaxonomyStore for MemoryTaxonomyStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_by_slug(&self, taxonomy: &str, slug: &str) -> Result<Option<Term>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.find_by_slug(taxonomy, slug))
    }

    async fn find_by_name(&self, taxonomy: &str, name: &str) -> Result<Option<Term>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.find_by_name(taxonomy, name))
    }

    async fn create(&self, taxonomy: &str, name: &str) -> Result<Term> {
        let mut table = self.table.write().map_err(poisoned)?;
        table.create(taxonomy, name)
    }

    async fn assign(&self, taxonomy: &str, entity: EntityId, terms: &[TermId]) -> Result<()> {
        let mut table = self.table.write().map_err(poisoned)?;
        table.assign(taxonomy, entity, terms);
        Ok(())
    }

    async fn assigned(&self, taxonomy: &str, entity: EntityId) -> Result<Vec<Term>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.assigned(taxonomy, entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(slug: &str) -> DocumentDraft {
        DocumentDraft {
            entity_type: EntityType::College,
            slug: Slug::parse(slug).unwrap(),
            title: "ABC College".to_string(),
            content: String::new(),
            excerpt: String::new(),
            status: "publish".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryDocumentStore::new();
        let created = store.create(draft("abc-college")).await.unwrap();

        let found = store
            .find_by_slug(EntityType::College, &Slug::parse("abc-college").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);

        let missing = store
            .find_by_slug(EntityType::Course, &Slug::parse("abc-college").unwrap())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_preserves_id_and_attributes() {
        let store = MemoryDocumentStore::new();
        let created = store.create(draft("abc-college")).await.unwrap();
        store
            .set_attribute(created.id, "_college_state", json!("Maharashtra"))
            .await
            .unwrap();

        let mut changed = draft("abc-college");
        changed.title = "ABC College of Engineering".to_string();
        let updated = store.update(created.id, changed).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "ABC College of Engineering");
        assert_eq!(
            store.get_attribute(created.id, "_college_state").await.unwrap(),
            Some(json!("Maharashtra"))
        );
    }

    #[tokio::test]
    async fn test_attributes_on_missing_entity() {
        let store = MemoryDocumentStore::new();
        let id = EntityId::new(99).unwrap();

        let result = store.get_attribute(id, "_linked_courses").await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let result = store.set_attribute(id, "_linked_courses", json!([])).await;
        assert!(result.is_err());
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_mutation_counter() {
        let store = MemoryDocumentStore::new();
        assert_eq!(store.mutation_count(), 0);

        let created = store.create(draft("abc")).await.unwrap();
        store.delete_attribute(created.id, "absent").await.unwrap();
        store.delete(created.id).await.unwrap();

        assert_eq!(store.mutation_count(), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_media_sideload_and_reject() {
        let media = MemoryMediaStore::new();
        let owner = EntityId::new(1).unwrap();

        let id = media.sideload("https://example.com/logo.png", owner).await.unwrap();
        assert_eq!(
            media.url(id).await.unwrap().as_deref(),
            Some("https://example.com/logo.png")
        );

        media.reject("https://unreachable.example/x.jpg");
        assert!(media
            .sideload("https://unreachable.example/x.jpg", owner)
            .await
            .is_err());
        assert_eq!(media.asset_count(), 1);
    }

    #[tokio::test]
    async fn test_taxonomy_get_or_create() {
        let taxonomy = MemoryTaxonomyStore::new();
        let term = taxonomy.create("college_stream", "Engineering").await.unwrap();

        let by_slug = taxonomy
            .find_by_slug("college_stream", "engineering")
            .await
            .unwrap();
        assert_eq!(by_slug, Some(term.clone()));

        let by_name = taxonomy
            .find_by_name("college_stream", "Engineering")
            .await
            .unwrap();
        assert_eq!(by_name, Some(term));

        assert!(taxonomy.create("college_stream", "engineering").await.is_err());
    }
}

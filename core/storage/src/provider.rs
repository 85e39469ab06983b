//! Store trait definitions.
//!
//! The sync engine never touches persistence directly; it talks to these
//! three collaborators. Each individual call is expected to be atomic, but
//! no guarantee is made across calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use campussync_common::{AssetId, EntityId, EntityType, Result, Slug, TermId};

/// A stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier, stable for the entity's lifetime.
    pub id: EntityId,
    /// Content type.
    pub entity_type: EntityType,
    /// Unique (per type) slug.
    pub slug: Slug,
    /// Display title.
    pub title: String,
    /// Rich-text body.
    pub content: String,
    /// Short summary.
    pub excerpt: String,
    /// Publication status (e.g. "publish", "draft").
    pub status: String,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification of the scalar fields.
    pub modified: DateTime<Utc>,
    /// Featured asset, if any.
    pub featured_media: Option<AssetId>,
    /// Typed attributes, keyed by attribute name.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

/// Scalar fields written on create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDraft {
    /// Content type.
    pub entity_type: EntityType,
    /// Slug to store under.
    pub slug: Slug,
    /// Display title.
    pub title: String,
    /// Rich-text body.
    pub content: String,
    /// Short summary.
    pub excerpt: String,
    /// Publication status.
    pub status: String,
}

/// Filter for a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Content type to list.
    pub entity_type: EntityType,
    /// Only entities with this status.
    pub status: String,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub per_page: u32,
    /// Exclusive lower bound on modification time.
    pub modified_after: Option<DateTime<Utc>>,
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Number of items matching the filter, independent of pagination.
    pub total: u64,
}

/// Document persistence keyed by slug per entity type.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Find an entity by its identity.
    async fn find_by_slug(&self, entity_type: EntityType, slug: &Slug) -> Result<Option<Document>>;

    /// Fetch an entity by identifier.
    async fn get(&self, id: EntityId) -> Result<Option<Document>>;

    /// Create a new entity.
    ///
    /// # Postconditions
    /// - A fresh, never-reused identifier is assigned
    /// - `created` and `modified` are set to now
    ///
    /// # Errors
    /// - Slug already taken for the type
    async fn create(&self, draft: DocumentDraft) -> Result<Document>;

    /// Update the scalar fields of an existing entity in place.
    ///
    /// # Postconditions
    /// - Identifier, attributes and featured media are preserved
    /// - `modified` is set to now
    ///
    /// # Errors
    /// - Entity not found
    /// - Slug taken by another entity of the type
    async fn update(&self, id: EntityId, draft: DocumentDraft) -> Result<Document>;

    /// Permanently remove an entity and all of its attributes.
    ///
    /// # Errors
    /// - Entity not found
    async fn delete(&self, id: EntityId) -> Result<()>;

    /// Read one attribute. Absent attributes yield `None`.
    ///
    /// # Errors
    /// - Entity not found
    async fn get_attribute(&self, id: EntityId, key: &str) -> Result<Option<Value>>;

    /// Replace one attribute value.
    ///
    /// # Errors
    /// - Entity not found
    async fn set_attribute(&self, id: EntityId, key: &str, value: Value) -> Result<()>;

    /// Remove one attribute. Removing an absent attribute is a no-op.
    ///
    /// # Errors
    /// - Entity not found
    async fn delete_attribute(&self, id: EntityId, key: &str) -> Result<()>;

    /// Set or clear the featured asset.
    ///
    /// # Errors
    /// - Entity not found
    async fn set_featured_media(&self, id: EntityId, asset: Option<AssetId>) -> Result<()>;

    /// List entities, most recently modified first.
    async fn list(&self, query: &ListQuery) -> Result<Page<Document>>;
}

/// Binary asset registry.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Get the backend name.
    fn name(&self) -> &str;

    /// Download the asset at `url` and register it on behalf of `owner`.
    ///
    /// # Errors
    /// - Download failed
    /// - Asset could not be stored
    async fn sideload(&self, url: &str, owner: EntityId) -> Result<AssetId>;

    /// Public URL of a registered asset, `None` if unknown.
    async fn url(&self, id: AssetId) -> Result<Option<String>>;
}

/// A taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// Term identifier.
    pub id: TermId,
    /// Display name.
    pub name: String,
    /// Normalized slug, unique per taxonomy.
    pub slug: String,
}

/// Term registry and per-entity term assignment.
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    /// Get the backend name.
    fn name(&self) -> &str;

    /// Find a term by slug.
    async fn find_by_slug(&self, taxonomy: &str, slug: &str) -> Result<Option<Term>>;

    /// Find a term by exact display name.
    async fn find_by_name(&self, taxonomy: &str, name: &str) -> Result<Option<Term>>;

    /// Create a term with the given display name.
    ///
    /// # Errors
    /// - Name normalizes to an empty slug
    /// - Slug already taken
    async fn create(&self, taxonomy: &str, name: &str) -> Result<Term>;

    /// Replace the entity's assignment in `taxonomy` with `terms`.
    async fn assign(&self, taxonomy: &str, entity: EntityId, terms: &[TermId]) -> Result<()>;

    /// Terms currently assigned to the entity, in assignment order.
    async fn assigned(&self, taxonomy: &str, entity: EntityId) -> Result<Vec<Term>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_serialization() {
        let document = Document {
            id: EntityId::new(12).unwrap(),
            entity_type: EntityType::College,
            slug: Slug::parse("abc-college").unwrap(),
            title: "ABC College".to_string(),
            content: "<p>Body</p>".to_string(),
            excerpt: String::new(),
            status: "publish".to_string(),
            created: Utc::now(),
            modified: Utc::now(),
            featured_media: AssetId::new(3),
            attributes: BTreeMap::from([(
                "_linked_courses".to_string(),
                serde_json::json!([4, 5]),
            )]),
        };

        let json = serde_json::to_string(&document).unwrap();
        let restored: Document = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, document.id);
        assert_eq!(restored.slug, document.slug);
        assert_eq!(restored.entity_type, EntityType::College);
        assert_eq!(restored.attributes["_linked_courses"], serde_json::json!([4, 5]));
    }
}

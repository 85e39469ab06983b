//! Import payload normalization.
//!
//! Raw JSON bodies are turned into typed requests in one pass. Parsing is
//! lenient: malformed fields fall back to their zero value and are judged
//! later, per item, by the engine.

use serde_json::{Map, Value};

use campussync_common::text::sanitize_key;
use campussync_common::{AssetId, EntityType, Slug};
use campussync_storage::DocumentDraft;

use crate::error::{SyncError, SyncResult};
use crate::sanitize::{absint, is_truthy, plain_text, rich_text, scalar_string};

/// Status applied when a payload names none.
pub const DEFAULT_STATUS: &str = "publish";

/// Suffix of the legacy relation payload keys (`linked_courses_slugs`).
const LEGACY_RELATION_SUFFIX: &str = "_slugs";

fn status_or_default(value: Option<&Value>) -> String {
    let status = value.map(|v| sanitize_key(&scalar_string(v))).unwrap_or_default();
    if status.is_empty() {
        DEFAULT_STATUS.to_string()
    } else {
        status
    }
}

fn object_field(map: &Map<String, Value>, key: &str) -> Map<String, Value> {
    map.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A validated import request.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Classify items without mutating any store.
    pub dry_run: bool,
    /// Items in submission order.
    pub items: Vec<ImportItem>,
}

impl ImportRequest {
    /// Parse a request body.
    ///
    /// Accepts `{dry_run?, items: [...]}` or the legacy
    /// `{types: {type: [item...]}}`, where each legacy item takes its type
    /// from the enclosing key.
    ///
    /// # Errors
    /// - `InvalidPayload` if the body is not a JSON object
    /// - `NoItems` if no items can be found
    pub fn from_value(payload: &Value) -> SyncResult<Self> {
        let body = payload.as_object().ok_or(SyncError::InvalidPayload)?;
        let dry_run = body.get("dry_run").is_some_and(is_truthy);

        let raw_items: Vec<Value> = match (body.get("items"), body.get("types")) {
            (Some(Value::Array(items)), _) if !items.is_empty() => items.clone(),
            (_, Some(Value::Object(types))) => types
                .iter()
                .filter_map(|(post_type, items)| Some((post_type, items.as_array()?)))
                .flat_map(|(post_type, items)| {
                    items.iter().filter_map(move |item| {
                        let mut item = item.as_object()?.clone();
                        item.insert("post_type".to_string(), Value::String(post_type.clone()));
                        Some(Value::Object(item))
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        if raw_items.is_empty() {
            return Err(SyncError::NoItems);
        }

        Ok(Self {
            dry_run,
            items: raw_items.iter().map(ImportItem::from_value).collect(),
        })
    }
}

/// One item of an import request, with scalar fields already sanitized.
#[derive(Debug, Clone, Default)]
pub struct ImportItem {
    /// Requested type name, key-normalized. May name an unsupported type.
    pub post_type: String,
    /// Slug from `slug`, else derived from the title.
    pub slug: Option<Slug>,
    /// Plain-text title.
    pub title: String,
    /// Rich-text body.
    pub content: String,
    /// Rich-text summary.
    pub excerpt: String,
    /// Key-normalized status.
    pub status: String,
    /// Deletion requested.
    pub delete: bool,
    /// Top-level featured image URL.
    pub featured_media_url: Option<String>,
    /// Top-level featured asset identifier.
    pub featured_media: Option<AssetId>,
    /// Raw `media` object.
    pub media: Map<String, Value>,
    /// Raw `meta` object.
    pub meta: Map<String, Value>,
    /// Raw `terms` object.
    pub terms: Map<String, Value>,
    /// Raw `relations` object, keyed by payload relation name.
    ///
    /// Each list replaces the entity's related set wholesale: an empty list
    /// unlinks every related entity (and their reciprocal entries), while an
    /// absent key or a non-list value leaves the relation untouched.
    pub relations: Map<String, Value>,
    /// Create related entities that do not exist yet.
    pub relations_create_missing: bool,
}

impl ImportItem {
    /// Normalize one raw item. Never fails; non-objects yield an item that
    /// the engine rejects as having an invalid type.
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };

        let title = map.get("title").map(plain_text).unwrap_or_default();
        let slug_source = map.get("slug").map(scalar_string);
        let slug = Slug::derive(slug_source.as_deref(), Some(&title));

        Self {
            post_type: map
                .get("post_type")
                .map(|v| sanitize_key(&scalar_string(v)))
                .unwrap_or_default(),
            slug,
            title,
            content: map.get("content").map(rich_text).unwrap_or_default(),
            excerpt: map.get("excerpt").map(rich_text).unwrap_or_default(),
            status: status_or_default(map.get("status")),
            delete: map.get("delete").is_some_and(is_truthy),
            featured_media_url: non_empty_string(map.get("featured_media_url")),
            featured_media: map
                .get("featured_media")
                .filter(|v| is_truthy(v))
                .and_then(|v| AssetId::new(absint(v))),
            media: object_field(map, "media"),
            meta: object_field(map, "meta"),
            terms: object_field(map, "terms"),
            relations: object_field(map, "relations"),
            relations_create_missing: map.get("relations_create_missing").is_some_and(is_truthy),
        }
    }

    /// Resolved entity type, `None` when unsupported.
    pub fn entity_type(&self) -> Option<EntityType> {
        EntityType::from_name(&self.post_type)
    }

    /// Scalar fields to write for an entity of `entity_type` stored under `slug`.
    pub fn draft(&self, entity_type: EntityType, slug: Slug) -> DocumentDraft {
        DocumentDraft {
            entity_type,
            slug,
            title: self.title.clone(),
            content: self.content.clone(),
            excerpt: self.excerpt.clone(),
            status: self.status.clone(),
        }
    }

    /// Featured image URL nested under `media`.
    pub fn nested_featured_media_url(&self) -> Option<String> {
        non_empty_string(self.media.get("featured_media_url"))
    }

    /// Entries given for a relation, if the payload addresses it at all.
    ///
    /// The primary key wins when it holds a non-empty list; otherwise the
    /// legacy `<key>_slugs` alias is consulted. A present but empty list
    /// yields `Some(&[])`, which clears the relation.
    pub fn relation_entries(&self, payload_key: &str) -> Option<&[Value]> {
        let legacy_key = format!("{}{}", payload_key, LEGACY_RELATION_SUFFIX);
        let primary = self
            .relations
            .get(payload_key)
            .and_then(Value::as_array)
            .map(Vec::as_slice);
        let legacy = self
            .relations
            .get(&legacy_key)
            .and_then(Value::as_array)
            .map(Vec::as_slice);

        match (primary, legacy) {
            (Some(entries), _) if !entries.is_empty() => Some(entries),
            (_, Some(entries)) if !entries.is_empty() => Some(entries),
            (Some(entries), _) | (None, Some(entries)) => Some(entries),
            (None, None) => None,
        }
    }
}

/// A reference to a related entity inside `relations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEntry {
    /// Bare slug.
    Slug(Slug),
    /// Structured record, usable to create the entity when it is missing.
    Descriptor(RelatedDescriptor),
}

/// Fields of a structured relation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedDescriptor {
    /// Slug from `slug`, else derived from the title.
    pub slug: Slug,
    /// Plain-text title, possibly empty.
    pub title: String,
    /// Key-normalized status.
    pub status: String,
    /// Rich-text body.
    pub content: String,
    /// Rich-text summary.
    pub excerpt: String,
}

impl RelationEntry {
    /// Normalize a raw entry. Entries without a usable slug yield `None`.
    pub fn normalize(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => Slug::parse(raw).ok().map(RelationEntry::Slug),
            Value::Object(map) => {
                let title = map
                    .get("title")
                    .filter(|v| is_truthy(v))
                    .map(plain_text)
                    .unwrap_or_default();
                let slug_source = map
                    .get("slug")
                    .filter(|v| is_truthy(v))
                    .map(scalar_string);
                let slug = Slug::derive(slug_source.as_deref(), Some(&title))?;

                Some(RelationEntry::Descriptor(RelatedDescriptor {
                    slug,
                    title,
                    status: status_or_default(map.get("status")),
                    content: map.get("content").map(rich_text).unwrap_or_default(),
                    excerpt: map.get("excerpt").map(rich_text).unwrap_or_default(),
                }))
            }
            _ => None,
        }
    }

    /// Slug of the referenced entity.
    pub fn slug(&self) -> &Slug {
        match self {
            RelationEntry::Slug(slug) => slug,
            RelationEntry::Descriptor(descriptor) => &descriptor.slug,
        }
    }

    /// Draft used to create the referenced entity when it is missing.
    ///
    /// The title falls back to the slug; the status defaults to published.
    pub fn draft(&self, entity_type: EntityType) -> DocumentDraft {
        match self {
            RelationEntry::Slug(slug) => DocumentDraft {
                entity_type,
                slug: slug.clone(),
                title: slug.to_string(),
                content: String::new(),
                excerpt: String::new(),
                status: DEFAULT_STATUS.to_string(),
            },
            RelationEntry::Descriptor(descriptor) => DocumentDraft {
                entity_type,
                slug: descriptor.slug.clone(),
                title: if descriptor.title.is_empty() {
                    descriptor.slug.to_string()
                } else {
                    descriptor.title.clone()
                },
                content: descriptor.content.clone(),
                excerpt: descriptor.excerpt.clone(),
                status: descriptor.status.clone(),
            },
        }
    }
}

//! Export request resolution and item shaping.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use campussync_common::text::sanitize_key;
use campussync_common::{AssetId, EntityType, Result};
use campussync_storage::{Document, DocumentStore, ListQuery, MediaStore, Page, StoreBundle};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::payload::DEFAULT_STATUS;
use crate::relations::parse_ids;
use crate::sanitize::{absint, leading_int};
use crate::schema::SchemaRegistry;

/// Raw export parameters as they arrive on the query string.
///
/// Every field is optional and kept as text; [`ExportQuery::resolve`]
/// applies defaults and clamping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportQuery {
    /// Comma-separated type names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<String>,
    /// Status filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// 1-based page number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    /// Page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<String>,
    /// ISO-8601 exclusive lower bound on modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

/// Export parameters after defaults and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    /// Types to export, in canonical order.
    pub types: Vec<EntityType>,
    /// Status filter.
    pub status: String,
    /// Page number, at least 1.
    pub page: u32,
    /// Page size within the configured bounds.
    pub per_page: u32,
    /// Exclusive lower bound on modification time.
    pub since: Option<DateTime<Utc>>,
}

fn non_blank(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ExportQuery {
    /// Apply defaults, clamp paging and validate the filters.
    ///
    /// # Errors
    /// - `NoTypes` if no supported type remains
    /// - `InvalidSince` if `since` is not a timestamp
    pub fn resolve(&self, config: &SyncConfig) -> SyncResult<ExportPlan> {
        let types: BTreeSet<EntityType> = match non_blank(&self.types) {
            Some(raw) => raw
                .split(',')
                .filter_map(|name| EntityType::from_name(name.trim()))
                .collect(),
            None => config.default_export_types.iter().copied().collect(),
        };
        if types.is_empty() {
            return Err(SyncError::NoTypes);
        }

        let status = non_blank(&self.status)
            .map(sanitize_key)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());

        let page = non_blank(&self.page).map_or(1, leading_int).max(1);
        let per_page = match non_blank(&self.per_page).map_or(0, leading_int) {
            0 => i64::from(config.default_per_page),
            n => n,
        }
        .clamp(1, i64::from(config.max_per_page));

        let since = non_blank(&self.since).map(parse_since).transpose()?;

        Ok(ExportPlan {
            types: types.into_iter().collect(),
            status,
            page: u32::try_from(page).unwrap_or(u32::MAX),
            per_page: u32::try_from(per_page).unwrap_or(config.max_per_page),
            since,
        })
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_since(raw: &str) -> SyncResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SyncError::InvalidSince(raw.to_string()))
}

/// An asset reference with its public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Asset identifier, 0 when unset.
    pub id: u64,
    /// Public URL, empty when unset or unknown.
    pub url: String,
}

/// Media resolved for one attachment attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaValue {
    /// Scalar attachment.
    Single(MediaRef),
    /// List attachment.
    Gallery(Vec<MediaRef>),
}

/// One entity as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportItem {
    pub post_type: EntityType,
    pub id: u64,
    pub slug: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub date_gmt: String,
    pub modified_gmt: String,
    pub featured_media: u64,
    pub featured_media_url: String,
    /// Every declared attribute, absent ones as their zero value.
    pub meta: Map<String, Value>,
    pub media: BTreeMap<String, MediaValue>,
    /// Assigned term slugs per taxonomy.
    pub terms: BTreeMap<String, Vec<String>>,
}

/// Export envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResponse {
    pub types: Vec<EntityType>,
    pub page: u32,
    pub per_page: u32,
    pub items: BTreeMap<EntityType, Vec<ExportItem>>,
    /// Matches per type, independent of pagination.
    pub totals: BTreeMap<EntityType, u64>,
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Public URL of an asset; lookup failures degrade to an empty string.
async fn media_url(media: &dyn MediaStore, id: u64) -> String {
    let Some(asset) = AssetId::new(id) else {
        return String::new();
    };
    match media.url(asset).await {
        Ok(url) => url.unwrap_or_default(),
        Err(e) => {
            warn!("Could not resolve URL of asset {}: {}", asset, e);
            String::new()
        }
    }
}

/// List one page of `entity_type` under `plan`.
pub(crate) async fn list_page(
    documents: &dyn DocumentStore,
    entity_type: EntityType,
    plan: &ExportPlan,
) -> Result<Page<Document>> {
    documents
        .list(&ListQuery {
            entity_type,
            status: plan.status.clone(),
            page: plan.page,
            per_page: plan.per_page,
            modified_after: plan.since,
        })
        .await
}

/// Shape a stored entity into its export form.
pub(crate) async fn shape_item(
    document: Document,
    schema: &SchemaRegistry,
    stores: &StoreBundle,
) -> Result<ExportItem> {
    let entity_type = document.entity_type;

    let meta: Map<String, Value> = schema
        .fields(entity_type)
        .iter()
        .map(|field| {
            let value = document
                .attributes
                .get(field.key)
                .cloned()
                .unwrap_or_else(|| field.field_type.zero_value());
            (field.key.to_string(), value)
        })
        .collect();

    let mut media = BTreeMap::new();
    for field in schema.attachments(entity_type) {
        let stored = document.attributes.get(field.key);
        let value = if field.field_type.is_list() {
            let mut gallery = Vec::new();
            for id in parse_ids(stored) {
                gallery.push(MediaRef {
                    id: id.get(),
                    url: media_url(stores.media.as_ref(), id.get()).await,
                });
            }
            MediaValue::Gallery(gallery)
        } else {
            let id = stored.map_or(0, absint);
            MediaValue::Single(MediaRef {
                id,
                url: media_url(stores.media.as_ref(), id).await,
            })
        };
        media.insert(field.key.to_string(), value);
    }

    let mut terms = BTreeMap::new();
    for taxonomy in schema.taxonomies(entity_type) {
        let assigned = stores.taxonomy.assigned(taxonomy, document.id).await?;
        terms.insert(
            taxonomy.to_string(),
            assigned.into_iter().map(|term| term.slug).collect(),
        );
    }

    let featured_media = document.featured_media.map_or(0, |id| id.get());

    Ok(ExportItem {
        post_type: entity_type,
        id: document.id.get(),
        slug: document.slug.to_string(),
        featured_media_url: media_url(stores.media.as_ref(), featured_media).await,
        featured_media,
        title: document.title,
        content: document.content,
        excerpt: document.excerpt,
        status: document.status,
        date_gmt: timestamp(&document.created),
        modified_gmt: timestamp(&document.modified),
        meta,
        media,
        terms,
    })
}

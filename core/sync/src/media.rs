//! Media reference resolution.
//!
//! Import payloads reference assets by identifier, by URL, or by an object
//! carrying either. URLs are sideloaded through the [`MediaStore`]; any
//! failure degrades to "no asset" and is only logged.

use serde_json::{json, Value};
use tracing::{debug, warn};

use campussync_common::{AssetId, EntityId};
use campussync_storage::MediaStore;

use crate::config::ListOrder;
use crate::sanitize::{absint, dedup, is_numeric, is_truthy};
use crate::schema::FieldSpec;

/// Whether `raw` is an absolute http(s) URL with a host.
pub fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

/// Resolves media references to asset identifiers on behalf of one entity.
pub struct MediaResolver<'a> {
    media: &'a dyn MediaStore,
    owner: EntityId,
    order: ListOrder,
}

impl<'a> MediaResolver<'a> {
    /// Create a resolver that registers sideloaded assets for `owner`.
    pub fn new(media: &'a dyn MediaStore, owner: EntityId, order: ListOrder) -> Self {
        Self {
            media,
            owner,
            order,
        }
    }

    /// Download and register the asset at `url`.
    ///
    /// Returns `None` for invalid URLs and failed downloads.
    pub async fn sideload(&self, url: &str) -> Option<AssetId> {
        if !is_http_url(url) {
            debug!("Ignoring media reference that is not an http(s) URL: {}", url);
            return None;
        }

        match self.media.sideload(url, self.owner).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Media sideload failed for {} (entity {}): {}", url, self.owner, e);
                None
            }
        }
    }

    /// Resolve a single media reference.
    ///
    /// Accepted forms, in order: `{id}`, `{url}`, a number or numeric
    /// string, an http(s) URL string. Anything else yields `None`.
    pub async fn resolve_entry(&self, entry: &Value) -> Option<AssetId> {
        match entry {
            Value::Object(map) => {
                if let Some(id) = map.get("id").filter(|v| is_truthy(v)) {
                    AssetId::new(absint(id))
                } else if let Some(Value::String(url)) = map.get("url").filter(|v| is_truthy(v)) {
                    self.sideload(url).await
                } else {
                    None
                }
            }
            Value::Number(_) => AssetId::new(absint(entry)),
            Value::String(raw) if is_numeric(raw) => AssetId::new(absint(entry)),
            Value::String(raw) => self.sideload(raw).await,
            _ => None,
        }
    }

    /// Resolve a list of references, or a single reference treated as a
    /// one-element list. Unresolvable entries are dropped.
    pub async fn resolve_list(&self, value: &Value) -> Vec<AssetId> {
        let entries = match value {
            Value::Array(entries) => entries.as_slice(),
            single => std::slice::from_ref(single),
        };

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(id) = self.resolve_entry(entry).await {
                ids.push(id);
            }
        }
        dedup(ids, self.order)
    }

    /// Resolve the value of an attachment attribute into its stored form:
    /// an identifier (0 when unresolved) or a list of identifiers.
    pub async fn resolve_field(&self, field: &FieldSpec, value: &Value) -> Value {
        if field.field_type.is_list() {
            let ids: Vec<u64> = self
                .resolve_list(value)
                .await
                .into_iter()
                .map(|id| id.get())
                .collect();
            json!(ids)
        } else {
            json!(self.resolve_entry(value).await.map_or(0, |id| id.get()))
        }
    }
}

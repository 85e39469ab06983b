//! Core sync engine that orchestrates export and import.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use campussync_common::{EntityId, EntityType, Result};
use campussync_storage::StoreBundle;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::export::{list_page, shape_item, ExportQuery, ExportResponse};
use crate::media::MediaResolver;
use crate::payload::{ImportItem, ImportRequest, RelationEntry};
use crate::relations::{Reconciler, RelationKeys};
use crate::report::{ImportAction, ImportReport, ItemOutcome};
use crate::sanitize::sanitize_value;
use crate::schema::SchemaRegistry;
use crate::terms::resolve_terms;

/// Main sync engine.
///
/// Holds no mutable state of its own; concurrent calls race at the store
/// layer with last-write-wins semantics.
pub struct SyncEngine {
    /// Persistence collaborators.
    stores: StoreBundle,
    /// Attribute declarations.
    schema: Arc<SchemaRegistry>,
    /// Relationship writer.
    reconciler: Reconciler,
    /// Configuration.
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(stores: StoreBundle, schema: Arc<SchemaRegistry>, config: SyncConfig) -> Self {
        let reconciler = Reconciler::new(
            stores.documents.clone(),
            config.reconcile_mode,
            config.list_order,
        );

        Self {
            stores,
            schema,
            reconciler,
            config,
        }
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get the attribute schema.
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Get the store collaborators.
    pub fn stores(&self) -> &StoreBundle {
        &self.stores
    }

    /// Export one page of every requested type.
    ///
    /// # Errors
    /// - `NoTypes` / `InvalidSince` for bad filters
    /// - Store failure
    pub async fn export(&self, query: &ExportQuery) -> SyncResult<ExportResponse> {
        let plan = query.resolve(&self.config)?;
        let mut items = BTreeMap::new();
        let mut totals = BTreeMap::new();

        for &entity_type in &plan.types {
            let page = list_page(self.stores.documents.as_ref(), entity_type, &plan).await?;

            let mut shaped = Vec::with_capacity(page.items.len());
            for document in page.items {
                shaped.push(shape_item(document, &self.schema, &self.stores).await?);
            }

            debug!(
                "Exported {} of {} {} entities (page {})",
                shaped.len(),
                page.total,
                entity_type,
                plan.page
            );
            items.insert(entity_type, shaped);
            totals.insert(entity_type, page.total);
        }

        Ok(ExportResponse {
            types: plan.types,
            page: plan.page,
            per_page: plan.per_page,
            items,
            totals,
        })
    }

    /// Parse a raw request body and import it.
    ///
    /// # Errors
    /// - `InvalidPayload` / `NoItems` for unusable bodies
    pub async fn import_value(&self, payload: &Value) -> SyncResult<ImportReport> {
        let request = ImportRequest::from_value(payload)?;
        Ok(self.import(request).await)
    }

    /// Import a batch of items.
    ///
    /// Items are processed in order and independently: a failing item is
    /// counted as skipped and the batch continues.
    pub async fn import(&self, request: ImportRequest) -> ImportReport {
        info!(
            "Importing {} items{}",
            request.items.len(),
            if request.dry_run { " (dry run)" } else { "" }
        );

        let mut report = ImportReport::default();
        for item in &request.items {
            let result = self.import_item(item, request.dry_run).await;
            if let Err(e) = &result {
                warn!("Skipping item '{}': {}", item.post_type, e);
            }
            report.record(result);
        }

        info!(
            "Import finished: {} created, {} updated, {} deleted, {} skipped",
            report.created, report.updated, report.deleted, report.skipped
        );
        report
    }

    async fn import_item(&self, item: &ImportItem, dry_run: bool) -> SyncResult<ItemOutcome> {
        let entity_type = item.entity_type().ok_or(SyncError::InvalidType)?;
        let slug = item.slug.clone().ok_or(SyncError::MissingSlug)?;
        let documents = self.stores.documents.as_ref();

        let existing = documents.find_by_slug(entity_type, &slug).await?;
        let existing_id = existing.as_ref().map(|d| d.id);
        let outcome = |action: ImportAction, id: Option<EntityId>| ItemOutcome {
            action,
            post_type: entity_type,
            slug: slug.to_string(),
            id: id.map_or(0, |id| id.get()),
        };

        if item.delete {
            if let (Some(id), false) = (existing_id, dry_run) {
                self.delete_entity(entity_type, id).await?;
                info!("Deleted {} '{}' ({})", entity_type, slug, id);
            }
            return Ok(outcome(ImportAction::Deleted, existing_id));
        }

        let action = if existing.is_some() {
            ImportAction::Updated
        } else {
            ImportAction::Created
        };
        if dry_run {
            return Ok(outcome(action, existing_id));
        }

        let draft = item.draft(entity_type, slug.clone());
        let document = match existing_id {
            Some(id) => documents.update(id, draft).await?,
            None => documents.create(draft).await?,
        };
        let id = document.id;

        self.apply_meta(entity_type, id, &item.meta).await?;
        self.apply_media(entity_type, id, item).await?;
        self.apply_terms(entity_type, id, &item.terms).await?;
        self.apply_relations(entity_type, id, item).await?;

        debug!("{:?} {} '{}' ({})", action, entity_type, slug, id);
        Ok(outcome(action, Some(id)))
    }

    /// Detach every relationship and term, then remove the entity.
    async fn delete_entity(&self, entity_type: EntityType, id: EntityId) -> Result<()> {
        for (field, relation) in self.schema.relations(entity_type) {
            let keys = RelationKeys {
                key: field.key,
                reciprocal_key: relation.reciprocal_key,
            };
            self.reconciler.detach_all(id, keys).await?;
        }
        for taxonomy in self.schema.taxonomies(entity_type) {
            self.stores.taxonomy.assign(taxonomy, id, &[]).await?;
        }
        self.stores.documents.delete(id).await
    }

    /// Write every declared attribute present in `meta`.
    ///
    /// Relationship attributes are skipped; only `relations` may change them.
    async fn apply_meta(
        &self,
        entity_type: EntityType,
        id: EntityId,
        meta: &Map<String, Value>,
    ) -> Result<()> {
        if meta.is_empty() {
            return Ok(());
        }

        let resolver = MediaResolver::new(self.stores.media.as_ref(), id, self.config.list_order);
        for field in self.schema.fields(entity_type) {
            let Some(raw) = meta.get(field.key) else {
                continue;
            };

            let value = if field.relation.is_some() {
                debug!("Ignoring relationship attribute {} in meta", field.key);
                continue;
            } else if field.attachment {
                resolver.resolve_field(field, raw).await
            } else {
                sanitize_value(field.field_type, raw, self.config.list_order)
            };

            self.stores
                .documents
                .set_attribute(id, field.key, value)
                .await?;
        }

        Ok(())
    }

    /// Set the featured asset and resolve attachment attributes under `media`.
    ///
    /// Featured image precedence: top-level URL, then top-level identifier,
    /// then the URL nested under `media`.
    async fn apply_media(&self, entity_type: EntityType, id: EntityId, item: &ImportItem) -> Result<()> {
        let resolver = MediaResolver::new(self.stores.media.as_ref(), id, self.config.list_order);

        let featured = if let Some(url) = &item.featured_media_url {
            resolver.sideload(url).await
        } else if let Some(asset) = item.featured_media {
            Some(asset)
        } else if let Some(url) = item.nested_featured_media_url() {
            resolver.sideload(&url).await
        } else {
            None
        };

        if let Some(asset) = featured {
            self.stores
                .documents
                .set_featured_media(id, Some(asset))
                .await?;
        }

        for field in self.schema.attachments(entity_type) {
            let Some(raw) = item.media.get(field.key) else {
                continue;
            };
            let value = resolver.resolve_field(field, raw).await;
            self.stores
                .documents
                .set_attribute(id, field.key, value)
                .await?;
        }

        Ok(())
    }

    /// Replace the entity's term assignment in each of its taxonomies.
    ///
    /// An assignment is left untouched when no term resolves.
    async fn apply_terms(
        &self,
        entity_type: EntityType,
        id: EntityId,
        terms: &Map<String, Value>,
    ) -> Result<()> {
        for taxonomy in self.schema.taxonomies(entity_type) {
            let Some(values) = terms
                .get(*taxonomy)
                .and_then(Value::as_array)
                .filter(|values| !values.is_empty())
            else {
                continue;
            };

            let ids = resolve_terms(self.stores.taxonomy.as_ref(), taxonomy, values).await?;
            if ids.is_empty() {
                debug!("No {} terms resolved for {}; assignment unchanged", taxonomy, id);
                continue;
            }
            self.stores.taxonomy.assign(taxonomy, id, &ids).await?;
        }

        Ok(())
    }

    /// Reconcile every relation addressed by the item's `relations`.
    async fn apply_relations(
        &self,
        entity_type: EntityType,
        id: EntityId,
        item: &ImportItem,
    ) -> Result<()> {
        for (field, relation) in self.schema.relations(entity_type) {
            let Some(entries) = item.relation_entries(relation.payload_key) else {
                continue;
            };

            let desired = self
                .resolve_related(entries, relation.related, item.relations_create_missing)
                .await?;
            let keys = RelationKeys {
                key: field.key,
                reciprocal_key: relation.reciprocal_key,
            };
            self.reconciler.reconcile(id, keys, desired).await?;
        }

        Ok(())
    }

    /// Map relation entries to identifiers of existing (or newly created)
    /// entities of type `related`. Unresolvable entries are dropped.
    async fn resolve_related(
        &self,
        entries: &[Value],
        related: EntityType,
        create_missing: bool,
    ) -> Result<Vec<EntityId>> {
        let documents = self.stores.documents.as_ref();
        let mut ids = Vec::with_capacity(entries.len());

        for entry in entries.iter().filter_map(RelationEntry::normalize) {
            match documents.find_by_slug(related, entry.slug()).await? {
                Some(document) => ids.push(document.id),
                None if create_missing => match documents.create(entry.draft(related)).await {
                    Ok(document) => {
                        info!("Created missing {} '{}' ({})", related, entry.slug(), document.id);
                        ids.push(document.id);
                    }
                    Err(e) => warn!("Could not create {} '{}': {}", related, entry.slug(), e),
                },
                None => debug!("Related {} '{}' not found; skipping", related, entry.slug()),
            }
        }

        Ok(ids)
    }
}

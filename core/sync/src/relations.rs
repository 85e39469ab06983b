//! Bidirectional relationship reconciliation.
//!
//! A relationship attribute on one entity lists the identifiers of related
//! entities; the related entities carry the reciprocal attribute. The
//! store does not enforce symmetry, so every write through the
//! [`Reconciler`] repairs the far side as well.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use campussync_common::{EntityId, Error, Result};
use campussync_storage::DocumentStore;

use crate::config::{ListOrder, ReconcileMode};
use crate::sanitize::{absint, dedup};

/// Keys of one relationship, seen from the entity being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationKeys<'a> {
    /// Attribute on the entity itself.
    pub key: &'a str,
    /// Attribute on each related entity.
    pub reciprocal_key: &'a str,
}

/// Membership changes applied by a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationChange {
    /// Identifiers that joined the relation.
    pub added: Vec<EntityId>,
    /// Identifiers that left the relation.
    pub removed: Vec<EntityId>,
}

/// Read a stored identifier list. Anything that is not a list reads as empty.
pub fn parse_ids(value: Option<&Value>) -> Vec<EntityId> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| EntityId::new(absint(v))).collect())
        .unwrap_or_default()
}

fn ids_value(ids: &[EntityId]) -> Value {
    json!(ids.iter().map(EntityId::get).collect::<Vec<_>>())
}

/// One attribute write prepared by staged reconciliation.
#[derive(Debug, Clone)]
struct PlannedWrite {
    entity: EntityId,
    key: String,
    /// Value before the write, `None` if the attribute was absent.
    before: Option<Value>,
    /// Value to write, `None` to delete the attribute.
    after: Option<Value>,
}

/// Keeps relationship attributes symmetric.
pub struct Reconciler {
    documents: Arc<dyn DocumentStore>,
    mode: ReconcileMode,
    order: ListOrder,
}

impl Reconciler {
    /// Create a reconciler over `documents`.
    pub fn new(documents: Arc<dyn DocumentStore>, mode: ReconcileMode, order: ListOrder) -> Self {
        Self {
            documents,
            mode,
            order,
        }
    }

    /// Replace `entity`'s relationship list with `desired` and repair the
    /// reciprocal lists of every entity that joined or left.
    ///
    /// # Preconditions
    /// - `entity` exists
    ///
    /// # Postconditions
    /// - The entity's list equals `desired`, deduplicated
    /// - Every removed entity's reciprocal list no longer contains `entity`
    /// - Every added entity's reciprocal list contains `entity`
    /// - Members present before and after are not touched
    ///
    /// Related entities that no longer exist are skipped.
    ///
    /// # Errors
    /// - Entity not found
    /// - Store failure (in staged mode, applied writes are rolled back first)
    pub async fn reconcile(
        &self,
        entity: EntityId,
        keys: RelationKeys<'_>,
        desired: Vec<EntityId>,
    ) -> Result<RelationChange> {
        let desired = dedup(desired, self.order);
        let current = parse_ids(self.documents.get_attribute(entity, keys.key).await?.as_ref());

        let change = RelationChange {
            added: desired
                .iter()
                .filter(|id| !current.contains(id))
                .copied()
                .collect(),
            removed: current
                .iter()
                .filter(|id| !desired.contains(id))
                .copied()
                .collect(),
        };

        debug!(
            "Reconciling {} of {}: +{:?} -{:?}",
            keys.key, entity, change.added, change.removed
        );

        match self.mode {
            ReconcileMode::SelfHealing => {
                self.documents
                    .set_attribute(entity, keys.key, ids_value(&desired))
                    .await?;
                for related in &change.removed {
                    self.unlink(*related, keys.reciprocal_key, entity).await?;
                }
                for related in &change.added {
                    self.link(*related, keys.reciprocal_key, entity).await?;
                }
            }
            ReconcileMode::Staged => {
                let mut plan = vec![PlannedWrite {
                    entity,
                    key: keys.key.to_string(),
                    before: self.documents.get_attribute(entity, keys.key).await?,
                    after: Some(ids_value(&desired)),
                }];
                for related in &change.removed {
                    plan.extend(self.plan_unlink(*related, keys.reciprocal_key, entity).await?);
                }
                for related in &change.added {
                    plan.extend(self.plan_link(*related, keys.reciprocal_key, entity).await?);
                }
                self.commit(plan).await?;
            }
        }

        Ok(change)
    }

    /// Remove `entity` from the reciprocal list of everything it relates
    /// to, then delete its own relationship attribute. Used before deleting
    /// the entity.
    ///
    /// # Errors
    /// - Entity not found
    /// - Store failure
    pub async fn detach_all(&self, entity: EntityId, keys: RelationKeys<'_>) -> Result<()> {
        let before = self.documents.get_attribute(entity, keys.key).await?;
        let current = parse_ids(before.as_ref());

        match self.mode {
            ReconcileMode::SelfHealing => {
                for related in &current {
                    self.unlink(*related, keys.reciprocal_key, entity).await?;
                }
                self.documents.delete_attribute(entity, keys.key).await?;
            }
            ReconcileMode::Staged => {
                let mut plan = Vec::with_capacity(current.len() + 1);
                for related in &current {
                    plan.extend(self.plan_unlink(*related, keys.reciprocal_key, entity).await?);
                }
                plan.push(PlannedWrite {
                    entity,
                    key: keys.key.to_string(),
                    before,
                    after: None,
                });
                self.commit(plan).await?;
            }
        }

        Ok(())
    }

    /// Read a related entity's list, `None` if the entity is gone.
    async fn read_related(&self, related: EntityId, key: &str) -> Result<Option<Option<Value>>> {
        match self.documents.get_attribute(related, key).await {
            Ok(value) => Ok(Some(value)),
            Err(Error::NotFound(_)) => {
                warn!("Related entity {} no longer exists; skipping {}", related, key);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn unlink(&self, related: EntityId, key: &str, entity: EntityId) -> Result<()> {
        if let Some(write) = self.plan_unlink(related, key, entity).await? {
            self.apply(&write).await?;
        }
        Ok(())
    }

    async fn link(&self, related: EntityId, key: &str, entity: EntityId) -> Result<()> {
        if let Some(write) = self.plan_link(related, key, entity).await? {
            self.apply(&write).await?;
        }
        Ok(())
    }

    async fn plan_unlink(
        &self,
        related: EntityId,
        key: &str,
        entity: EntityId,
    ) -> Result<Option<PlannedWrite>> {
        let Some(before) = self.read_related(related, key).await? else {
            return Ok(None);
        };
        let mut ids = parse_ids(before.as_ref());
        if !ids.contains(&entity) {
            return Ok(None);
        }
        ids.retain(|id| *id != entity);

        Ok(Some(PlannedWrite {
            entity: related,
            key: key.to_string(),
            before,
            after: Some(ids_value(&ids)),
        }))
    }

    async fn plan_link(
        &self,
        related: EntityId,
        key: &str,
        entity: EntityId,
    ) -> Result<Option<PlannedWrite>> {
        let Some(before) = self.read_related(related, key).await? else {
            return Ok(None);
        };
        let mut ids = parse_ids(before.as_ref());
        if ids.contains(&entity) {
            return Ok(None);
        }
        ids.push(entity);

        Ok(Some(PlannedWrite {
            entity: related,
            key: key.to_string(),
            before,
            after: Some(ids_value(&ids)),
        }))
    }

    async fn apply(&self, write: &PlannedWrite) -> Result<()> {
        match &write.after {
            Some(value) => {
                self.documents
                    .set_attribute(write.entity, &write.key, value.clone())
                    .await
            }
            None => self.documents.delete_attribute(write.entity, &write.key).await,
        }
    }

    /// Apply a prepared write-set, restoring applied writes on failure.
    async fn commit(&self, plan: Vec<PlannedWrite>) -> Result<()> {
        for (index, write) in plan.iter().enumerate() {
            if let Err(e) = self.apply(write).await {
                warn!(
                    "Write of {} on {} failed, rolling back {} applied writes: {}",
                    write.key, write.entity, index, e
                );
                for applied in plan[..index].iter().rev() {
                    let restore = PlannedWrite {
                        entity: applied.entity,
                        key: applied.key.clone(),
                        before: None,
                        after: applied.before.clone(),
                    };
                    if let Err(rollback) = self.apply(&restore).await {
                        error!(
                            "Rollback of {} on {} failed: {}",
                            applied.key, applied.entity, rollback
                        );
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use campussync_common::{AssetId, EntityType, Slug};
    use campussync_storage::{
        Document, DocumentDraft, ListQuery, MemoryDocumentStore, Page,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COURSES: RelationKeys<'static> = RelationKeys {
        key: "_linked_courses",
        reciprocal_key: "_linked_colleges",
    };
    const COLLEGES: RelationKeys<'static> = RelationKeys {
        key: "_linked_colleges",
        reciprocal_key: "_linked_courses",
    };

    async fn entity(store: &dyn DocumentStore, entity_type: EntityType, slug: &str) -> EntityId {
        store
            .create(DocumentDraft {
                entity_type,
                slug: Slug::parse(slug).unwrap(),
                title: slug.to_string(),
                content: String::new(),
                excerpt: String::new(),
                status: "publish".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    async fn ids(store: &dyn DocumentStore, id: EntityId, key: &str) -> Vec<EntityId> {
        parse_ids(store.get_attribute(id, key).await.unwrap().as_ref())
    }

    struct Fixture {
        college: EntityId,
        x: EntityId,
        y: EntityId,
        z: EntityId,
    }

    /// College linked to {Y, Z}, both reciprocating.
    async fn linked_fixture(store: &dyn DocumentStore, reconciler: &Reconciler) -> Fixture {
        let college = entity(store, EntityType::College, "abc-college").await;
        let x = entity(store, EntityType::Course, "x").await;
        let y = entity(store, EntityType::Course, "y").await;
        let z = entity(store, EntityType::Course, "z").await;

        reconciler.reconcile(college, COURSES, vec![y, z]).await.unwrap();
        Fixture { college, x, y, z }
    }

    #[tokio::test]
    async fn test_reconcile_repairs_both_sides() {
        for mode in [ReconcileMode::SelfHealing, ReconcileMode::Staged] {
            let store = Arc::new(MemoryDocumentStore::new());
            let reconciler = Reconciler::new(store.clone(), mode, ListOrder::Preserve);
            let f = linked_fixture(store.as_ref(), &reconciler).await;

            let change = reconciler
                .reconcile(f.college, COURSES, vec![f.x, f.y])
                .await
                .unwrap();
            assert_eq!(change.added, vec![f.x]);
            assert_eq!(change.removed, vec![f.z]);

            assert_eq!(ids(store.as_ref(), f.college, COURSES.key).await, vec![f.x, f.y]);
            assert_eq!(ids(store.as_ref(), f.x, COLLEGES.key).await, vec![f.college]);
            assert_eq!(ids(store.as_ref(), f.y, COLLEGES.key).await, vec![f.college]);
            assert!(ids(store.as_ref(), f.z, COLLEGES.key).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_unchanged_members_untouched() {
        let store = Arc::new(MemoryDocumentStore::new());
        let reconciler =
            Reconciler::new(store.clone(), ReconcileMode::SelfHealing, ListOrder::Preserve);
        let f = linked_fixture(store.as_ref(), &reconciler).await;

        // Y also reciprocates an unrelated college; it must survive.
        store
            .set_attribute(f.y, COLLEGES.key, json!([f.college.get(), 99]))
            .await
            .unwrap();
        let before = store.mutation_count();

        reconciler
            .reconcile(f.college, COURSES, vec![f.y, f.z])
            .await
            .unwrap();

        // Only the college's own list is rewritten.
        assert_eq!(store.mutation_count(), before + 1);
        assert_eq!(
            store.get_attribute(f.y, COLLEGES.key).await.unwrap(),
            Some(json!([f.college.get(), 99]))
        );
    }

    #[tokio::test]
    async fn test_reconcile_heals_prior_corruption() {
        let store = Arc::new(MemoryDocumentStore::new());
        let reconciler =
            Reconciler::new(store.clone(), ReconcileMode::SelfHealing, ListOrder::Preserve);
        let college = entity(store.as_ref(), EntityType::College, "c").await;
        let course = entity(store.as_ref(), EntityType::Course, "k").await;

        // Own list is unreadable and the course never got the link.
        store
            .set_attribute(college, COURSES.key, json!("corrupt"))
            .await
            .unwrap();

        reconciler.reconcile(college, COURSES, vec![course]).await.unwrap();
        assert_eq!(ids(store.as_ref(), course, COLLEGES.key).await, vec![college]);
    }

    #[tokio::test]
    async fn test_detach_all() {
        for mode in [ReconcileMode::SelfHealing, ReconcileMode::Staged] {
            let store = Arc::new(MemoryDocumentStore::new());
            let reconciler = Reconciler::new(store.clone(), mode, ListOrder::Preserve);
            let f = linked_fixture(store.as_ref(), &reconciler).await;

            reconciler.detach_all(f.college, COURSES).await.unwrap();

            assert!(store
                .get_attribute(f.college, COURSES.key)
                .await
                .unwrap()
                .is_none());
            assert!(ids(store.as_ref(), f.y, COLLEGES.key).await.is_empty());
            assert!(ids(store.as_ref(), f.z, COLLEGES.key).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_related_entity_skipped() {
        let store = Arc::new(MemoryDocumentStore::new());
        let reconciler =
            Reconciler::new(store.clone(), ReconcileMode::Staged, ListOrder::Preserve);
        let f = linked_fixture(store.as_ref(), &reconciler).await;

        store.delete(f.z).await.unwrap();
        reconciler.reconcile(f.college, COURSES, vec![f.y]).await.unwrap();
        assert_eq!(ids(store.as_ref(), f.college, COURSES.key).await, vec![f.y]);
    }

    #[tokio::test]
    async fn test_missing_entity_fails() {
        let store = Arc::new(MemoryDocumentStore::new());
        let reconciler =
            Reconciler::new(store.clone(), ReconcileMode::SelfHealing, ListOrder::Preserve);

        let result = reconciler
            .reconcile(EntityId::new(42).unwrap(), COURSES, Vec::new())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    /// Document store that fails exactly one chosen attribute write.
    struct FlakyStore {
        inner: MemoryDocumentStore,
        writes: AtomicUsize,
        fail_on: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn find_by_slug(&self, t: EntityType, s: &Slug) -> Result<Option<Document>> {
            self.inner.find_by_slug(t, s).await
        }
        async fn get(&self, id: EntityId) -> Result<Option<Document>> {
            self.inner.get(id).await
        }
        async fn create(&self, draft: DocumentDraft) -> Result<Document> {
            self.inner.create(draft).await
        }
        async fn update(&self, id: EntityId, draft: DocumentDraft) -> Result<Document> {
            self.inner.update(id, draft).await
        }
        async fn delete(&self, id: EntityId) -> Result<()> {
            self.inner.delete(id).await
        }
        async fn get_attribute(&self, id: EntityId, key: &str) -> Result<Option<Value>> {
            self.inner.get_attribute(id, key).await
        }
        async fn set_attribute(&self, id: EntityId, key: &str, value: Value) -> Result<()> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_on.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".to_string()));
            }
            self.inner.set_attribute(id, key, value).await
        }
        async fn delete_attribute(&self, id: EntityId, key: &str) -> Result<()> {
            self.inner.delete_attribute(id, key).await
        }
        async fn set_featured_media(&self, id: EntityId, asset: Option<AssetId>) -> Result<()> {
            self.inner.set_featured_media(id, asset).await
        }
        async fn list(&self, query: &ListQuery) -> Result<Page<Document>> {
            self.inner.list(query).await
        }
    }

    #[tokio::test]
    async fn test_staged_rolls_back_on_write_failure() {
        let store = Arc::new(FlakyStore {
            inner: MemoryDocumentStore::new(),
            writes: AtomicUsize::new(0),
            fail_on: AtomicUsize::new(usize::MAX),
        });
        let reconciler =
            Reconciler::new(store.clone(), ReconcileMode::Staged, ListOrder::Preserve);
        let f = linked_fixture(store.as_ref(), &reconciler).await;

        // Own list and Z's unlink succeed, X's link fails.
        let next = store.writes.load(Ordering::SeqCst);
        store.fail_on.store(next + 2, Ordering::SeqCst);
        let result = reconciler.reconcile(f.college, COURSES, vec![f.x, f.y]).await;
        assert!(matches!(result, Err(Error::Storage(_))));

        let store_ref: &dyn DocumentStore = store.as_ref();
        assert_eq!(ids(store_ref, f.college, COURSES.key).await, vec![f.y, f.z]);
        assert_eq!(ids(store_ref, f.z, COLLEGES.key).await, vec![f.college]);
        assert!(ids(store_ref, f.x, COLLEGES.key).await.is_empty());
    }
}

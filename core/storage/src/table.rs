//! Plain in-process tables shared by the memory and local backends.
//!
//! The tables hold no locks; callers wrap them in whatever guard suits
//! their backend and are responsible for persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use campussync_common::text::slugify;
use campussync_common::{AssetId, EntityId, EntityType, Error, Result, Slug, TermId};

use crate::provider::{Document, DocumentDraft, ListQuery, Page, Term};

/// Entity table with slug uniqueness per type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DocumentTable {
    next_id: u64,
    documents: BTreeMap<EntityId, Document>,
}

impl Default for DocumentTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            documents: BTreeMap::new(),
        }
    }
}

impl DocumentTable {
    pub(crate) fn find_by_slug(&self, entity_type: EntityType, slug: &Slug) -> Option<&Document> {
        self.documents
            .values()
            .find(|d| d.entity_type == entity_type && &d.slug == slug)
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&Document> {
        self.documents.get(&id)
    }

    fn get_mut(&mut self, id: EntityId) -> Result<&mut Document> {
        self.documents
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Entity not found: {}", id)))
    }

    fn ensure_slug_free(&self, draft: &DocumentDraft, owner: Option<EntityId>) -> Result<()> {
        match self.find_by_slug(draft.entity_type, &draft.slug) {
            Some(existing) if Some(existing.id) != owner => Err(Error::AlreadyExists(format!(
                "Slug '{}' already used by {} {}",
                draft.slug, draft.entity_type, existing.id
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn create(&mut self, draft: DocumentDraft, now: DateTime<Utc>) -> Result<Document> {
        self.ensure_slug_free(&draft, None)?;

        let id = EntityId::new(self.next_id)
            .ok_or_else(|| Error::Storage("Identifier space exhausted".to_string()))?;
        self.next_id += 1;

        let document = Document {
            id,
            entity_type: draft.entity_type,
            slug: draft.slug,
            title: draft.title,
            content: draft.content,
            excerpt: draft.excerpt,
            status: draft.status,
            created: now,
            modified: now,
            featured_media: None,
            attributes: BTreeMap::new(),
        };
        self.documents.insert(id, document.clone());

        Ok(document)
    }

    pub(crate) fn update(
        &mut self,
        id: EntityId,
        draft: DocumentDraft,
        now: DateTime<Utc>,
    ) -> Result<Document> {
        self.ensure_slug_free(&draft, Some(id))?;

        let document = self.get_mut(id)?;
        if document.entity_type != draft.entity_type {
            return Err(Error::InvalidInput(format!(
                "Entity {} is a {}, not a {}",
                id, document.entity_type, draft.entity_type
            )));
        }

        document.slug = draft.slug;
        document.title = draft.title;
        document.content = draft.content;
        document.excerpt = draft.excerpt;
        document.status = draft.status;
        document.modified = now;

        Ok(document.clone())
    }

    pub(crate) fn delete(&mut self, id: EntityId) -> Result<()> {
        self.documents
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Entity not found: {}", id)))
    }

    pub(crate) fn get_attribute(&self, id: EntityId, key: &str) -> Result<Option<Value>> {
        let document = self
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Entity not found: {}", id)))?;
        Ok(document.attributes.get(key).cloned())
    }

    pub(crate) fn set_attribute(&mut self, id: EntityId, key: &str, value: Value) -> Result<()> {
        self.get_mut(id)?.attributes.insert(key.to_string(), value);
        Ok(())
    }

    pub(crate) fn delete_attribute(&mut self, id: EntityId, key: &str) -> Result<()> {
        self.get_mut(id)?.attributes.remove(key);
        Ok(())
    }

    pub(crate) fn set_featured_media(&mut self, id: EntityId, asset: Option<AssetId>) -> Result<()> {
        self.get_mut(id)?.featured_media = asset;
        Ok(())
    }

    pub(crate) fn list(&self, query: &ListQuery) -> Page<Document> {
        let mut matches: Vec<&Document> = self
            .documents
            .values()
            .filter(|d| d.entity_type == query.entity_type && d.status == query.status)
            .filter(|d| query.modified_after.map_or(true, |after| d.modified > after))
            .collect();

        matches.sort_by(|a, b| b.modified.cmp(&a.modified).then(b.id.cmp(&a.id)));

        let total = matches.len() as u64;
        let per_page = query.per_page.max(1) as usize;
        let offset = (query.page.max(1) as usize - 1).saturating_mul(per_page);

        let items = matches
            .into_iter()
            .skip(offset)
            .take(per_page)
            .cloned()
            .collect();

        Page { items, total }
    }

    pub(crate) fn len(&self) -> usize {
        self.documents.len()
    }
}

/// Term registry and assignments, grouped by taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TermTable {
    next_id: u64,
    terms: BTreeMap<String, Vec<Term>>,
    assignments: BTreeMap<String, BTreeMap<EntityId, Vec<TermId>>>,
}

impl Default for TermTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            terms: BTreeMap::new(),
            assignments: BTreeMap::new(),
        }
    }
}

impl TermTable {
    pub(crate) fn find_by_slug(&self, taxonomy: &str, slug: &str) -> Option<Term> {
        self.terms
            .get(taxonomy)
            .and_then(|terms| terms.iter().find(|t| t.slug == slug))
            .cloned()
    }

    pub(crate) fn find_by_name(&self, taxonomy: &str, name: &str) -> Option<Term> {
        self.terms
            .get(taxonomy)
            .and_then(|terms| terms.iter().find(|t| t.name == name))
            .cloned()
    }

    pub(crate) fn create(&mut self, taxonomy: &str, name: &str) -> Result<Term> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(Error::InvalidInput(format!("Invalid term name: '{}'", name)));
        }
        if self.find_by_slug(taxonomy, &slug).is_some() {
            return Err(Error::AlreadyExists(format!(
                "Term '{}' already exists in {}",
                slug, taxonomy
            )));
        }

        let id = TermId::new(self.next_id)
            .ok_or_else(|| Error::Storage("Identifier space exhausted".to_string()))?;
        self.next_id += 1;

        let term = Term {
            id,
            name: name.to_string(),
            slug,
        };
        self.terms
            .entry(taxonomy.to_string())
            .or_default()
            .push(term.clone());

        Ok(term)
    }

    pub(crate) fn assign(&mut self, taxonomy: &str, entity: EntityId, terms: &[TermId]) {
        let mut unique: Vec<TermId> = Vec::with_capacity(terms.len());
        for id in terms {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let by_entity = self.assignments.entry(taxonomy.to_string()).or_default();
        if unique.is_empty() {
            by_entity.remove(&entity);
        } else {
            by_entity.insert(entity, unique);
        }
    }

    pub(crate) fn assigned(&self, taxonomy: &str, entity: EntityId) -> Vec<Term> {
        let Some(ids) = self
            .assignments
            .get(taxonomy)
            .and_then(|by_entity| by_entity.get(&entity))
        else {
            return Vec::new();
        };

        let Some(terms) = self.terms.get(taxonomy) else {
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| terms.iter().find(|t| t.id == *id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft(entity_type: EntityType, slug: &str) -> DocumentDraft {
        DocumentDraft {
            entity_type,
            slug: Slug::parse(slug).unwrap(),
            title: slug.to_string(),
            content: String::new(),
            excerpt: String::new(),
            status: "publish".to_string(),
        }
    }

    #[test]
    fn test_slug_unique_per_type() {
        let mut table = DocumentTable::default();
        let now = Utc::now();

        table.create(draft(EntityType::College, "abc"), now).unwrap();
        table.create(draft(EntityType::Course, "abc"), now).unwrap();

        let result = table.create(draft(EntityType::College, "abc"), now);
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut table = DocumentTable::default();
        let now = Utc::now();

        let first = table.create(draft(EntityType::Exam, "a"), now).unwrap();
        table.delete(first.id).unwrap();
        let second = table.create(draft(EntityType::Exam, "a"), now).unwrap();

        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_list_orders_and_paginates() {
        let mut table = DocumentTable::default();
        let base = Utc::now();

        for (i, slug) in ["one", "two", "three"].iter().enumerate() {
            table
                .create(draft(EntityType::Course, slug), base + Duration::seconds(i as i64))
                .unwrap();
        }

        let query = ListQuery {
            entity_type: EntityType::Course,
            status: "publish".to_string(),
            page: 1,
            per_page: 2,
            modified_after: None,
        };
        let page = table.list(&query);
        assert_eq!(page.total, 3);
        let slugs: Vec<&str> = page.items.iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(slugs, vec!["three", "two"]);

        let page = table.list(&ListQuery { page: 2, ..query.clone() });
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].slug.as_str(), "one");

        let page = table.list(&ListQuery {
            modified_after: Some(base),
            ..query
        });
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_term_assignment_replaces() {
        let mut terms = TermTable::default();
        let entity = EntityId::new(1).unwrap();

        let engineering = terms.create("college_stream", "Engineering").unwrap();
        let medical = terms.create("college_stream", "Medical").unwrap();

        terms.assign("college_stream", entity, &[engineering.id, medical.id, engineering.id]);
        assert_eq!(terms.assigned("college_stream", entity).len(), 2);

        terms.assign("college_stream", entity, &[medical.id]);
        let assigned = terms.assigned("college_stream", entity);
        assert_eq!(assigned, vec![medical]);
    }
}

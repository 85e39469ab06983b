//! Import batch reporting.

use serde::{Deserialize, Serialize};

use campussync_common::EntityType;

use crate::error::SyncResult;

/// What an import did to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportAction {
    Created,
    Updated,
    Deleted,
}

/// Result of one successfully processed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub action: ImportAction,
    pub post_type: EntityType,
    pub slug: String,
    /// Entity identifier; 0 for dry-run creates and deletes of missing entities.
    pub id: u64,
}

/// Summary of an import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub skipped: u64,
    /// One message per skipped item, in submission order.
    pub errors: Vec<String>,
    pub items: Vec<ItemOutcome>,
}

impl ImportReport {
    /// Fold one item result into the report.
    pub fn record(&mut self, result: SyncResult<ItemOutcome>) {
        match result {
            Ok(outcome) => {
                match outcome.action {
                    ImportAction::Created => self.created += 1,
                    ImportAction::Updated => self.updated += 1,
                    ImportAction::Deleted => self.deleted += 1,
                }
                self.items.push(outcome);
            }
            Err(e) => {
                self.skipped += 1;
                self.errors.push(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_record_counts() {
        let mut report = ImportReport::default();
        report.record(Ok(ItemOutcome {
            action: ImportAction::Created,
            post_type: EntityType::Exam,
            slug: "jee-main".to_string(),
            id: 3,
        }));
        report.record(Err(SyncError::MissingSlug));

        assert_eq!(report.created, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors, vec!["Item is missing a slug or title.".to_string()]);
        assert_eq!(report.items.len(), 1);
    }

    #[test]
    fn test_wire_shape() {
        let outcome = ItemOutcome {
            action: ImportAction::Deleted,
            post_type: EntityType::Course,
            slug: "obsolete-course".to_string(),
            id: 0,
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({
                "action": "deleted",
                "post_type": "course",
                "slug": "obsolete-course",
                "id": 0
            })
        );
    }
}

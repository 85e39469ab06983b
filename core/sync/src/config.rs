//! Engine configuration.

use serde::{Deserialize, Serialize};

use campussync_common::{EntityType, Error, Result};

/// How relationship reconciliation applies its writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Apply each write as soon as it is computed. A failure part-way
    /// leaves the relation asymmetric until the next reconciliation
    /// touching either side repairs it.
    #[default]
    SelfHealing,
    /// Read everything and prepare the full write-set first, then apply it.
    /// Nothing is written if a read fails; if a write fails, the writes
    /// already applied are restored to their prepared snapshot.
    Staged,
}

/// Ordering policy for deduplicated list attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    /// Keep the first occurrence of every element, in input order.
    #[default]
    Preserve,
    /// Sort elements; input order is not retained.
    Unordered,
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Types exported when a request names none.
    pub default_export_types: Vec<EntityType>,
    /// Upper bound for the export page size.
    pub max_per_page: u32,
    /// Page size used when a request names none.
    pub default_per_page: u32,
    /// Relationship write strategy.
    pub reconcile_mode: ReconcileMode,
    /// Ordering of deduplicated list attributes.
    pub list_order: ListOrder,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_export_types: vec![EntityType::College, EntityType::Course, EntityType::Exam],
            max_per_page: 200,
            default_per_page: 100,
            reconcile_mode: ReconcileMode::SelfHealing,
            list_order: ListOrder::Preserve,
        }
    }
}

impl SyncConfig {
    /// Check the configuration for internal consistency.
    ///
    /// # Errors
    /// - No default export types
    /// - Zero page sizes, or default page size above the maximum
    pub fn validate(&self) -> Result<()> {
        if self.default_export_types.is_empty() {
            return Err(Error::InvalidInput(
                "default_export_types must name at least one type".to_string(),
            ));
        }
        if self.max_per_page == 0 || self.default_per_page == 0 {
            return Err(Error::InvalidInput("Page sizes must be positive".to_string()));
        }
        if self.default_per_page > self.max_per_page {
            return Err(Error::InvalidInput(format!(
                "default_per_page ({}) exceeds max_per_page ({})",
                self.default_per_page, self.max_per_page
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_per_page, 200);
        assert_eq!(config.default_per_page, 100);
        assert_eq!(config.reconcile_mode, ReconcileMode::SelfHealing);
        assert_eq!(config.list_order, ListOrder::Preserve);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"reconcile_mode": "staged", "list_order": "unordered"}"#)
                .unwrap();
        assert_eq!(config.reconcile_mode, ReconcileMode::Staged);
        assert_eq!(config.list_order, ListOrder::Unordered);
        assert_eq!(config.default_export_types.len(), 3);
    }

    #[test]
    fn test_validate_rejects_inconsistent_page_sizes() {
        let config = SyncConfig {
            default_per_page: 500,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            default_export_types: Vec::new(),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

//! Campus Sync Engine
//!
//! Import and export of college, course, exam and stream entities:
//! - Declarative attribute schema per entity type
//! - Attribute sanitizing by declared type
//! - Media sideloading and taxonomy term resolution
//! - Bidirectional relationship reconciliation
//! - Paginated, filtered export

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod media;
pub mod payload;
pub mod relations;
pub mod report;
pub mod sanitize;
pub mod schema;
pub mod terms;

// Re-export main types
pub use config::{ListOrder, ReconcileMode, SyncConfig};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use export::{ExportItem, ExportPlan, ExportQuery, ExportResponse, MediaRef, MediaValue};
pub use payload::{ImportItem, ImportRequest, RelationEntry};
pub use relations::{Reconciler, RelationChange, RelationKeys};
pub use report::{ImportAction, ImportReport, ItemOutcome};
pub use schema::{FieldSpec, FieldType, Relation, SchemaRegistry};

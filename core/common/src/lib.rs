//! Common utilities and types shared across campussync modules.
//!
//! This module provides the error type, entity identifiers and the text
//! normalization helpers (slugs, keys, plain text) used by every layer.

pub mod error;
pub mod text;
pub mod types;

pub use error::{Error, Result};
pub use types::{AssetId, EntityId, EntityType, Slug, TermId};

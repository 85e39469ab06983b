//! Common types used throughout campussync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::text::slugify;

/// The content types managed by the sync service.
///
/// Declaration order is the canonical order used for export envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    College,
    Course,
    Exam,
    Stream,
}

impl EntityType {
    /// Every supported type, in canonical order.
    pub const ALL: [EntityType; 4] = [
        EntityType::College,
        EntityType::Course,
        EntityType::Exam,
        EntityType::Stream,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::College => "college",
            EntityType::Course => "course",
            EntityType::Exam => "exam",
            EntityType::Stream => "stream",
        }
    }

    /// Look up a type by its wire name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_name(s).ok_or_else(|| {
            crate::Error::InvalidInput(format!("Unsupported entity type: {}", s))
        })
    }
}

/// Store-assigned identifier of an entity.
///
/// Identifiers are never zero; `0` is reserved on the wire for "no entity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Wrap a raw identifier. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a media asset owned by the media store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(u64);

impl AssetId {
    /// Wrap a raw identifier. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a taxonomy term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(u64);

impl TermId {
    /// Wrap a raw identifier. Returns `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// URL-safe, lowercase identifier of an entity within its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Normalize arbitrary text into a slug.
    ///
    /// # Postconditions
    /// - Result contains only `[a-z0-9_-]`, with no leading/trailing dash
    ///
    /// # Errors
    /// - Returns error if nothing usable remains after normalization
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let slug = slugify(raw);
        if slug.is_empty() {
            return Err(crate::Error::InvalidInput(format!(
                "Cannot derive a slug from '{}'",
                raw
            )));
        }
        Ok(Self(slug))
    }

    /// Derive a slug from an explicit slug, falling back to a title.
    pub fn derive(slug: Option<&str>, title: Option<&str>) -> Option<Self> {
        slug.and_then(|s| Self::parse(s).ok())
            .or_else(|| title.and_then(|t| Self::parse(t).ok()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_names() {
        for ty in EntityType::ALL {
            assert_eq!(EntityType::from_name(ty.as_str()), Some(ty));
        }
        assert_eq!(EntityType::from_name("page"), None);
        assert!("College".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_entity_type_serde() {
        let json = serde_json::to_string(&EntityType::Stream).unwrap();
        assert_eq!(json, "\"stream\"");
        let ty: EntityType = serde_json::from_str("\"exam\"").unwrap();
        assert_eq!(ty, EntityType::Exam);
    }

    #[test]
    fn test_canonical_order() {
        let mut types = vec![EntityType::Stream, EntityType::College, EntityType::Exam];
        types.sort();
        assert_eq!(
            types,
            vec![EntityType::College, EntityType::Exam, EntityType::Stream]
        );
    }

    #[test]
    fn test_zero_ids_rejected() {
        assert!(EntityId::new(0).is_none());
        assert!(AssetId::new(0).is_none());
        assert!(TermId::new(0).is_none());
        assert_eq!(EntityId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn test_slug_parse() {
        let slug = Slug::parse("ABC College").unwrap();
        assert_eq!(slug.as_str(), "abc-college");
        assert!(Slug::parse("  !!! ").is_err());
    }

    #[test]
    fn test_slug_derive_falls_back_to_title() {
        let slug = Slug::derive(None, Some("B.Tech")).unwrap();
        assert_eq!(slug.as_str(), "b-tech");

        let slug = Slug::derive(Some(""), Some("MBA")).unwrap();
        assert_eq!(slug.as_str(), "mba");

        assert!(Slug::derive(None, None).is_none());
        assert!(Slug::derive(Some("--"), Some("")).is_none());
    }
}

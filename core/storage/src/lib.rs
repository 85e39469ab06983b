//! Persistence collaborators for campussync.
//!
//! The sync engine talks to three trait objects: a [`DocumentStore`] for
//! entities and their attributes, a [`MediaStore`] for sideloaded assets and
//! a [`TaxonomyStore`] for terms. Backends are resolved by name through a
//! [`StoreRegistry`].

pub mod http_media;
pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;
mod table;

pub use http_media::HttpMediaStore;
pub use local::LocalStore;
pub use memory::{MemoryDocumentStore, MemoryMediaStore, MemoryTaxonomyStore};
pub use provider::{
    Document, DocumentDraft, DocumentStore, ListQuery, MediaStore, Page, TaxonomyStore, Term,
};
pub use registry::{create_default_registry, StoreBundle, StoreFactory, StoreRegistry};

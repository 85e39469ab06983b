//! Taxonomy term resolution with get-or-create semantics.

use serde_json::Value;
use tracing::{debug, warn};

use campussync_common::text::slugify;
use campussync_common::{Result, TermId};
use campussync_storage::TaxonomyStore;

use crate::sanitize::plain_text;

/// Resolve free-text term values to term identifiers in `taxonomy`.
///
/// Each value is matched by normalized slug, then by display name, and
/// created when neither matches. Empty values are skipped and terms that
/// cannot be created are dropped with a warning. The result keeps input
/// order without duplicates.
///
/// # Errors
/// - A lookup against the taxonomy store failed
pub async fn resolve_terms(
    taxonomy_store: &dyn TaxonomyStore,
    taxonomy: &str,
    values: &[Value],
) -> Result<Vec<TermId>> {
    let mut ids = Vec::with_capacity(values.len());

    for value in values {
        let name = plain_text(value);
        if name.is_empty() {
            continue;
        }

        let existing = match taxonomy_store.find_by_slug(taxonomy, &slugify(&name)).await? {
            Some(term) => Some(term),
            None => taxonomy_store.find_by_name(taxonomy, &name).await?,
        };

        let id = match existing {
            Some(term) => term.id,
            None => match taxonomy_store.create(taxonomy, &name).await {
                Ok(term) => {
                    debug!("Created {} term '{}' ({})", taxonomy, term.name, term.slug);
                    term.id
                }
                Err(e) => {
                    warn!("Could not create {} term '{}': {}", taxonomy, name, e);
                    continue;
                }
            },
        };

        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    Ok(ids)
}

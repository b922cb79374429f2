//! Bulk listing import
//!
//! Accepts a bounded batch of candidate items, validates each one
//! independently, skips duplicates by natural key, and reports a
//! structured per-item outcome. One malformed item never aborts the
//! batch; only an oversized batch is rejected as a whole.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::info;
use uuid::Uuid;

use crate::catalog::store::{natural_key, CatalogStore};
use crate::db::schemas::{ListingDoc, Metadata};
use crate::types::{LodgewayError, Result};

/// One candidate item of an import batch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingCandidate {
    pub category: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub numeric: BTreeMap<String, f64>,
    pub available: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Outcome of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Imported,
    Skipped,
    Errored,
}

/// Per-item detail in the batch result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub index: usize,
    pub status: ImportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
}

/// Structured result of one import batch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: u32,
    pub skipped: u32,
    pub errored: u32,
    pub outcomes: Vec<ImportOutcome>,
}

fn validate(candidate: &ListingCandidate) -> std::result::Result<(), String> {
    let title = candidate.title.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() {
        return Err("missing title".to_string());
    }
    let category = candidate.category.as_deref().map(str::trim).unwrap_or("");
    if category.is_empty() {
        return Err("missing category".to_string());
    }
    for (attr, value) in &candidate.numeric {
        if !value.is_finite() {
            return Err(format!("numeric attribute {} is not finite", attr));
        }
    }
    Ok(())
}

fn to_doc(candidate: ListingCandidate) -> ListingDoc {
    ListingDoc {
        listing_id: Uuid::new_v4().to_string(),
        metadata: Metadata::new(),
        category: candidate.category,
        title: candidate.title,
        description: candidate.description,
        location: candidate.location,
        numeric: candidate.numeric,
        available: candidate.available,
        tags: candidate.tags,
        image_refs: Vec::new(),
        extra: BTreeMap::new(),
    }
}

/// Import a batch of candidates into the catalog
pub async fn import_batch(
    store: &dyn CatalogStore,
    candidates: Vec<ListingCandidate>,
    max_batch: usize,
) -> Result<ImportSummary> {
    if candidates.len() > max_batch {
        return Err(LodgewayError::Validation(format!(
            "batch of {} exceeds maximum of {} items",
            candidates.len(),
            max_batch
        )));
    }

    let mut summary = ImportSummary {
        imported: 0,
        skipped: 0,
        errored: 0,
        outcomes: Vec::with_capacity(candidates.len()),
    };
    let mut batch_keys: HashSet<String> = HashSet::new();

    for (index, candidate) in candidates.into_iter().enumerate() {
        if let Err(detail) = validate(&candidate) {
            summary.errored += 1;
            summary.outcomes.push(ImportOutcome {
                index,
                status: ImportStatus::Errored,
                detail: Some(detail),
                listing_id: None,
            });
            continue;
        }

        let key = natural_key(
            candidate.category.as_deref().unwrap_or(""),
            candidate.title.as_deref().unwrap_or(""),
            candidate.location.as_deref().unwrap_or(""),
        );

        let duplicate = batch_keys.contains(&key) || store.contains_natural_key(&key).await?;
        if duplicate {
            summary.skipped += 1;
            summary.outcomes.push(ImportOutcome {
                index,
                status: ImportStatus::Skipped,
                detail: Some("duplicate of an existing listing".to_string()),
                listing_id: None,
            });
            continue;
        }

        let doc = to_doc(candidate);
        let listing_id = doc.listing_id.clone();
        match store.insert(doc).await {
            Ok(()) => {
                batch_keys.insert(key);
                summary.imported += 1;
                summary.outcomes.push(ImportOutcome {
                    index,
                    status: ImportStatus::Imported,
                    detail: None,
                    listing_id: Some(listing_id),
                });
            }
            Err(e) => {
                summary.errored += 1;
                summary.outcomes.push(ImportOutcome {
                    index,
                    status: ImportStatus::Errored,
                    detail: Some(e.to_string()),
                    listing_id: None,
                });
            }
        }
    }

    info!(
        imported = summary.imported,
        skipped = summary.skipped,
        errored = summary.errored,
        "import batch processed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::store::MemoryCatalog;

    fn candidate(title: &str, category: &str, location: &str) -> ListingCandidate {
        ListingCandidate {
            category: Some(category.to_string()),
            title: Some(title.to_string()),
            description: None,
            location: Some(location.to_string()),
            numeric: BTreeMap::new(),
            available: Some(true),
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_valid_batch_imports_every_item() {
        let store = MemoryCatalog::new();
        let summary = import_batch(
            &store,
            vec![
                candidate("Studio A", "apartment", "Lyon"),
                candidate("Studio B", "apartment", "Lyon"),
            ],
            100,
        )
        .await
        .unwrap();

        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.errored, 0);
        assert!(summary.outcomes.iter().all(|o| o.listing_id.is_some()));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_whole() {
        let store = MemoryCatalog::new();
        let batch: Vec<ListingCandidate> = (0..3)
            .map(|i| candidate(&format!("T{}", i), "apartment", "Lyon"))
            .collect();

        assert!(matches!(
            import_batch(&store, batch, 2).await.unwrap_err(),
            LodgewayError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_item_does_not_abort_batch() {
        let store = MemoryCatalog::new();
        let mut broken = candidate("", "apartment", "Lyon");
        broken.title = None;

        let summary = import_batch(
            &store,
            vec![
                candidate("Good", "apartment", "Lyon"),
                broken,
                candidate("Also good", "dorm", "Paris"),
            ],
            100,
        )
        .await
        .unwrap();

        assert_eq!(summary.imported, 2);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.outcomes[1].status, ImportStatus::Errored);
        assert_eq!(summary.outcomes[1].detail.as_deref(), Some("missing title"));
    }

    #[tokio::test]
    async fn test_duplicates_are_skipped_by_natural_key() {
        let store = MemoryCatalog::new();

        // Seed an existing listing, then import a batch containing its
        // duplicate (case-insensitive) and an in-batch duplicate pair
        import_batch(&store, vec![candidate("Loft", "apartment", "Lyon")], 100)
            .await
            .unwrap();

        let summary = import_batch(
            &store,
            vec![
                candidate("LOFT", "apartment", "LYON"),
                candidate("Fresh", "apartment", "Lyon"),
                candidate("Fresh", "apartment", "Lyon"),
            ],
            100,
        )
        .await
        .unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.outcomes[0].status, ImportStatus::Skipped);
        assert_eq!(summary.outcomes[2].status, ImportStatus::Skipped);
    }

    #[tokio::test]
    async fn test_missing_category_is_errored() {
        let store = MemoryCatalog::new();
        let mut no_category = candidate("Titled", "", "Lyon");
        no_category.category = None;

        let summary = import_batch(&store, vec![no_category], 100).await.unwrap();
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.outcomes[0].detail.as_deref(), Some("missing category"));
    }
}

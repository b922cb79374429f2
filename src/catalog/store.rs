//! Catalog storage backends
//!
//! [`CatalogStore`] is the seam between the query engine and
//! persistence. The in-memory backend is the reference implementation
//! of the filter/sort/page semantics and backs the unit tests; the
//! MongoDB backend lives in [`crate::catalog::mongo`].

use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Mutex;

use crate::catalog::aggregate::{summarize_items, FacetSummary};
use crate::catalog::query::{FilterCriteria, PageSpec, SortDirection, SortKey, SortSpec};
use crate::db::schemas::ListingDoc;
use crate::types::Result;

/// One page of listings plus the totals the pagination UI needs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub items: Vec<ListingDoc>,
    /// 1-based page number
    pub page: u32,
    /// Page size the query ran with
    pub size: u32,
    /// Total matches across all pages
    pub total_count: u64,
    pub total_pages: u32,
}

impl Page {
    /// Pages needed for `total_count` items at `size` per page
    pub fn total_pages_for(total_count: u64, size: u32) -> u32 {
        if size == 0 {
            return 0;
        }
        total_count.div_ceil(u64::from(size)).min(u64::from(u32::MAX)) as u32
    }
}

/// Storage seam for catalog queries and aggregation
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert one listing
    async fn insert(&self, item: ListingDoc) -> Result<()>;

    /// Run a filtered, sorted, paginated query. `total_count` covers
    /// the whole filtered set; a page past the end has empty items.
    async fn execute(
        &self,
        criteria: &FilterCriteria,
        sort: &SortSpec,
        page: &PageSpec,
    ) -> Result<Page>;

    /// Keyword search across title/description/location/tags, capped
    async fn search(&self, keyword: &str, cap: usize) -> Result<Vec<ListingDoc>>;

    /// Facet summary over the whole collection or one category
    async fn summarize(&self, category: Option<&str>, top_locations: usize)
        -> Result<FacetSummary>;

    /// Whether a listing with this natural key already exists
    async fn contains_natural_key(&self, key: &str) -> Result<bool>;
}

/// Duplicate-detection key: category plus lowercased title and location
pub fn natural_key(category: &str, title: &str, location: &str) -> String {
    format!(
        "{}|{}|{}",
        category.trim().to_lowercase(),
        title.trim().to_lowercase(),
        location.trim().to_lowercase()
    )
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Whether a listing satisfies the structured predicate
pub fn matches_criteria(item: &ListingDoc, criteria: &FilterCriteria) -> bool {
    if let Some(category) = &criteria.category {
        if item.category.as_deref() != Some(category.as_str()) {
            return false;
        }
    }

    if let Some(location) = &criteria.location {
        match &item.location {
            Some(l) if contains_ci(l, location) => {}
            _ => return false,
        }
    }

    for (attr, range) in &criteria.numeric {
        match item.numeric.get(attr) {
            Some(value) if range.contains(*value) => {}
            _ => return false,
        }
    }

    if let Some(available) = criteria.available {
        if item.available != Some(available) {
            return false;
        }
    }

    if let Some(text) = &criteria.text {
        if !matches_keyword(item, text) {
            return false;
        }
    }

    if let Some(exclude) = &criteria.exclude_id {
        if &item.listing_id == exclude {
            return false;
        }
    }

    true
}

/// Whether a listing matches a free-text keyword on any textual field
pub fn matches_keyword(item: &ListingDoc, keyword: &str) -> bool {
    item.title.as_deref().is_some_and(|t| contains_ci(t, keyword))
        || item
            .description
            .as_deref()
            .is_some_and(|d| contains_ci(d, keyword))
        || item
            .location
            .as_deref()
            .is_some_and(|l| contains_ci(l, keyword))
        || item.tags.iter().any(|t| contains_ci(t, keyword))
}

enum SortValue {
    Num(f64),
    Text(String),
    Time(i64),
}

fn sort_value(item: &ListingDoc, key: &SortKey) -> Option<SortValue> {
    match key {
        SortKey::Numeric(attr) => item.numeric.get(attr).map(|n| SortValue::Num(*n)),
        SortKey::Title => item.title.as_ref().map(|t| SortValue::Text(t.to_lowercase())),
        SortKey::CreatedAt => item.created_at_millis().map(SortValue::Time),
    }
}

fn compare_values(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Num(x), SortValue::Num(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
        (SortValue::Time(x), SortValue::Time(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Sort listings in place: items missing the sort field go last, and
/// ties break on listing id for a stable page order
pub fn sort_listings(items: &mut [ListingDoc], sort: &SortSpec) {
    items.sort_by(|a, b| {
        let ord = match (sort_value(a, &sort.key), sort_value(b, &sort.key)) {
            (Some(x), Some(y)) => {
                let ord = compare_values(&x, &y);
                match sort.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        ord.then_with(|| a.listing_id.cmp(&b.listing_id))
    });
}

/// In-memory catalog used by unit tests
#[derive(Default)]
pub struct MemoryCatalog {
    items: Mutex<Vec<ListingDoc>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn insert(&self, item: ListingDoc) -> Result<()> {
        self.items.lock().unwrap().push(item);
        Ok(())
    }

    async fn execute(
        &self,
        criteria: &FilterCriteria,
        sort: &SortSpec,
        page: &PageSpec,
    ) -> Result<Page> {
        let items = self.items.lock().unwrap();
        let mut filtered: Vec<ListingDoc> = items
            .iter()
            .filter(|i| !i.metadata.is_deleted && matches_criteria(i, criteria))
            .cloned()
            .collect();
        drop(items);

        let total_count = filtered.len() as u64;
        sort_listings(&mut filtered, sort);

        let page_items: Vec<ListingDoc> = filtered
            .into_iter()
            .skip(page.skip() as usize)
            .take(page.size as usize)
            .collect();

        Ok(Page {
            items: page_items,
            page: page.page,
            size: page.size,
            total_count,
            total_pages: Page::total_pages_for(total_count, page.size),
        })
    }

    async fn search(&self, keyword: &str, cap: usize) -> Result<Vec<ListingDoc>> {
        let items = self.items.lock().unwrap();
        let mut matched: Vec<ListingDoc> = items
            .iter()
            .filter(|i| !i.metadata.is_deleted && matches_keyword(i, keyword))
            .cloned()
            .collect();
        drop(items);

        sort_listings(&mut matched, &SortSpec::default());
        matched.truncate(cap);
        Ok(matched)
    }

    async fn summarize(
        &self,
        category: Option<&str>,
        top_locations: usize,
    ) -> Result<FacetSummary> {
        let items = self.items.lock().unwrap();
        let scoped: Vec<&ListingDoc> = items
            .iter()
            .filter(|i| {
                !i.metadata.is_deleted
                    && category.is_none_or(|c| i.category.as_deref() == Some(c))
            })
            .collect();
        Ok(summarize_items(scoped, top_locations))
    }

    async fn contains_natural_key(&self, key: &str) -> Result<bool> {
        let items = self.items.lock().unwrap();
        Ok(items.iter().any(|i| {
            !i.metadata.is_deleted
                && natural_key(
                    i.category.as_deref().unwrap_or(""),
                    i.title.as_deref().unwrap_or(""),
                    i.location.as_deref().unwrap_or(""),
                ) == key
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::query::{NumericRange, QueryBuilder};
    use crate::db::schemas::Metadata;
    use std::collections::HashMap;

    fn listing(id: &str, category: &str, price: f64) -> ListingDoc {
        let mut doc = ListingDoc {
            listing_id: id.to_string(),
            category: Some(category.to_string()),
            title: Some(format!("Listing {}", id)),
            location: Some("Lyon".to_string()),
            available: Some(true),
            metadata: Metadata::new(),
            ..ListingDoc::default()
        };
        doc.numeric.insert("price".to_string(), price);
        doc
    }

    async fn seeded_store() -> MemoryCatalog {
        let store = MemoryCatalog::new();
        for (i, price) in [100.0, 200.0, 300.0, 400.0, 500.0].iter().enumerate() {
            store
                .insert(listing(&format!("L-{}", i), "apartment", *price))
                .await
                .unwrap();
        }
        store
    }

    fn all() -> FilterCriteria {
        FilterCriteria::default()
    }

    fn page(page: u32, size: u32) -> PageSpec {
        PageSpec { page, size }
    }

    #[tokio::test]
    async fn test_page_counts_are_consistent() {
        let store = seeded_store().await;

        let mut seen = 0usize;
        let mut page_no = 1u32;
        loop {
            let result = store
                .execute(&all(), &SortSpec::default(), &page(page_no, 2))
                .await
                .unwrap();
            assert_eq!(result.total_count, 5);
            assert_eq!(result.total_pages, 3);
            if result.items.is_empty() {
                break;
            }
            seen += result.items.len();
            page_no += 1;
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn test_page_past_end_is_empty_not_error() {
        let store = seeded_store().await;
        let result = store
            .execute(&all(), &SortSpec::default(), &page(9, 2))
            .await
            .unwrap();

        assert!(result.items.is_empty());
        assert_eq!(result.total_count, 5);
        assert_eq!(result.total_pages, 3);
    }

    #[tokio::test]
    async fn test_inclusive_price_bounds() {
        let store = MemoryCatalog::new();
        for (i, price) in [100.0, 200.0, 300.0].iter().enumerate() {
            store
                .insert(listing(&format!("L-{}", i), "apartment", *price))
                .await
                .unwrap();
        }

        let mut criteria = all();
        criteria.numeric.insert(
            "price".to_string(),
            NumericRange {
                min: Some(150.0),
                max: Some(250.0),
            },
        );
        let result = store
            .execute(&criteria, &SortSpec::default(), &page(1, 10))
            .await
            .unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.items[0].numeric["price"], 200.0);

        // Bounds equal to the value include it
        criteria.numeric.insert(
            "price".to_string(),
            NumericRange {
                min: Some(200.0),
                max: Some(200.0),
            },
        );
        let result = store
            .execute(&criteria, &SortSpec::default(), &page(1, 10))
            .await
            .unwrap();
        assert_eq!(result.total_count, 1);
    }

    #[tokio::test]
    async fn test_sort_by_price_with_direction() {
        let store = seeded_store().await;
        let sort = SortSpec {
            key: SortKey::Numeric("price".to_string()),
            direction: SortDirection::Descending,
        };

        let result = store.execute(&all(), &sort, &page(1, 10)).await.unwrap();
        let prices: Vec<f64> = result.items.iter().map(|i| i.numeric["price"]).collect();
        assert_eq!(prices, vec![500.0, 400.0, 300.0, 200.0, 100.0]);
    }

    #[tokio::test]
    async fn test_items_missing_sort_field_go_last() {
        let store = seeded_store().await;
        let mut unpriced = listing("L-zz", "apartment", 0.0);
        unpriced.numeric.clear();
        store.insert(unpriced).await.unwrap();

        let sort = SortSpec {
            key: SortKey::Numeric("price".to_string()),
            direction: SortDirection::Ascending,
        };
        let result = store.execute(&all(), &sort, &page(1, 10)).await.unwrap();
        assert_eq!(result.items.last().unwrap().listing_id, "L-zz");

        // Still last when the direction flips
        let sort = SortSpec {
            key: SortKey::Numeric("price".to_string()),
            direction: SortDirection::Descending,
        };
        let result = store.execute(&all(), &sort, &page(1, 10)).await.unwrap();
        assert_eq!(result.items.last().unwrap().listing_id, "L-zz");
    }

    #[tokio::test]
    async fn test_exclusion_filter_drops_one_item() {
        let store = seeded_store().await;
        let mut criteria = all();
        criteria.exclude_id = Some("L-2".to_string());

        let result = store
            .execute(&criteria, &SortSpec::default(), &page(1, 10))
            .await
            .unwrap();
        assert_eq!(result.total_count, 4);
        assert!(result.items.iter().all(|i| i.listing_id != "L-2"));
    }

    #[tokio::test]
    async fn test_location_and_text_match_case_insensitively() {
        let store = seeded_store().await;

        let mut criteria = all();
        criteria.location = Some("lyo".to_string());
        let result = store
            .execute(&criteria, &SortSpec::default(), &page(1, 10))
            .await
            .unwrap();
        assert_eq!(result.total_count, 5);

        let found = store.search("LISTING L-1", 20).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].listing_id, "L-1");
    }

    #[tokio::test]
    async fn test_search_is_capped() {
        let store = seeded_store().await;
        let found = store.search("listing", 3).await.unwrap();
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn test_builder_output_runs_against_store() {
        let store = seeded_store().await;
        let builder = QueryBuilder::new(10, 100);

        let mut raw = HashMap::new();
        raw.insert("min_price".to_string(), "250".to_string());
        raw.insert("sort".to_string(), "price".to_string());
        raw.insert("order".to_string(), "asc".to_string());

        let (criteria, sort, page_spec) = builder.build(&raw).unwrap();
        let result = store.execute(&criteria, &sort, &page_spec).await.unwrap();

        assert_eq!(result.total_count, 3);
        assert_eq!(result.items[0].numeric["price"], 300.0);
    }

    #[tokio::test]
    async fn test_summarize_scoped_to_category() {
        let store = seeded_store().await;
        store.insert(listing("U-1", "university", 900.0)).await.unwrap();

        let summary = store.summarize(Some("apartment"), 10).await.unwrap();
        assert_eq!(summary.price_max, 500.0);
        assert_eq!(summary.per_category.len(), 1);

        let summary = store.summarize(None, 10).await.unwrap();
        assert_eq!(summary.price_max, 900.0);
        assert_eq!(summary.per_category.len(), 2);
    }

    #[tokio::test]
    async fn test_soft_deleted_items_are_invisible() {
        let store = seeded_store().await;
        let mut ghost = listing("L-ghost", "apartment", 250.0);
        ghost.metadata.is_deleted = true;
        store.insert(ghost).await.unwrap();

        let result = store
            .execute(&all(), &SortSpec::default(), &page(1, 10))
            .await
            .unwrap();
        assert_eq!(result.total_count, 5);

        assert!(!store
            .contains_natural_key(&natural_key("apartment", "Listing L-ghost", "Lyon"))
            .await
            .unwrap());
    }

    #[test]
    fn test_total_pages_rounding() {
        assert_eq!(Page::total_pages_for(0, 10), 0);
        assert_eq!(Page::total_pages_for(1, 10), 1);
        assert_eq!(Page::total_pages_for(10, 10), 1);
        assert_eq!(Page::total_pages_for(11, 10), 2);
    }
}

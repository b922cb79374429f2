//! MongoDB catalog backend
//!
//! Translates [`FilterCriteria`] into `doc!` filters and the facet
//! summary into aggregation pipelines. Substring filters become
//! case-insensitive anchored-nowhere regexes over escaped user input.
//! `$avg`/`$min`/`$max` skip documents missing the field, which gives
//! the same missing-field tolerance the in-memory fold implements.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures_util::TryStreamExt;
use std::collections::BTreeMap;

use crate::catalog::aggregate::{
    CategoryStats, FacetSummary, LocationCount, PRIMARY_NUMERIC_ATTR,
};
use crate::catalog::query::{FilterCriteria, PageSpec, SortDirection, SortKey, SortSpec};
use crate::catalog::store::{CatalogStore, Page};
use crate::db::schemas::{ListingDoc, LISTING_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{LodgewayError, Result};

/// Escape regex metacharacters in user-supplied filter text
fn regex_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(
            c,
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn substring_regex(text: &str) -> Document {
    doc! { "$regex": regex_escape(text), "$options": "i" }
}

/// Read a numeric aggregation result regardless of BSON width
fn num_field(doc: &Document, key: &str) -> Option<f64> {
    match doc.get(key) {
        Some(Bson::Double(v)) => Some(*v),
        Some(Bson::Int32(v)) => Some(f64::from(*v)),
        Some(Bson::Int64(v)) => Some(*v as f64),
        _ => None,
    }
}

/// MongoDB-backed catalog store
pub struct MongoCatalog {
    listings: MongoCollection<ListingDoc>,
}

impl MongoCatalog {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let listings = client.collection::<ListingDoc>(LISTING_COLLECTION).await?;
        Ok(Self { listings })
    }

    /// Base filter shared by every query: scope plus soft-delete guard
    fn scope_filter(category: Option<&str>) -> Document {
        let mut filter = doc! { "metadata.is_deleted": { "$ne": true } };
        if let Some(c) = category {
            filter.insert("category", c);
        }
        filter
    }

    fn build_filter(criteria: &FilterCriteria) -> Document {
        let mut filter = Self::scope_filter(criteria.category.as_deref());

        if let Some(location) = &criteria.location {
            filter.insert("location", substring_regex(location));
        }

        for (attr, range) in &criteria.numeric {
            let mut bounds = Document::new();
            if let Some(min) = range.min {
                bounds.insert("$gte", min);
            }
            if let Some(max) = range.max {
                bounds.insert("$lte", max);
            }
            if !bounds.is_empty() {
                filter.insert(format!("numeric.{}", attr), bounds);
            }
        }

        if let Some(available) = criteria.available {
            filter.insert("available", available);
        }

        if let Some(text) = &criteria.text {
            let regex = substring_regex(text);
            filter.insert(
                "$or",
                vec![
                    doc! { "title": regex.clone() },
                    doc! { "description": regex.clone() },
                    doc! { "location": regex.clone() },
                    doc! { "tags": regex },
                ],
            );
        }

        if let Some(exclude) = &criteria.exclude_id {
            filter.insert("listing_id", doc! { "$ne": exclude.as_str() });
        }

        filter
    }

    fn sort_doc(sort: &SortSpec) -> Document {
        let field = match &sort.key {
            SortKey::Numeric(attr) => format!("numeric.{}", attr),
            SortKey::Title => "title".to_string(),
            SortKey::CreatedAt => "metadata.created_at".to_string(),
        };
        let direction = match sort.direction {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        // Secondary key keeps page boundaries stable across requests
        let mut sort_doc = Document::new();
        sort_doc.insert(field, direction);
        sort_doc.insert("listing_id", 1);
        sort_doc
    }

    async fn run_pipeline(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.listings
            .inner()
            .aggregate(pipeline)
            .await
            .map_err(|e| LodgewayError::Database(format!("aggregation failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| LodgewayError::Database(format!("aggregation cursor failed: {}", e)))
    }

    async fn distinct_values(&self, field: &str, filter: Document) -> Result<Vec<Bson>> {
        self.listings
            .inner()
            .distinct(field, filter)
            .await
            .map_err(|e| LodgewayError::Database(format!("distinct failed: {}", e)))
    }
}

#[async_trait]
impl CatalogStore for MongoCatalog {
    async fn insert(&self, item: ListingDoc) -> Result<()> {
        self.listings.insert_one(item).await?;
        Ok(())
    }

    async fn execute(
        &self,
        criteria: &FilterCriteria,
        sort: &SortSpec,
        page: &PageSpec,
    ) -> Result<Page> {
        let filter = Self::build_filter(criteria);

        // Count over the full filtered set, independent of the window
        let total_count = self
            .listings
            .inner()
            .count_documents(filter.clone())
            .await
            .map_err(|e| LodgewayError::Database(format!("count failed: {}", e)))?;

        let items: Vec<ListingDoc> = self
            .listings
            .inner()
            .find(filter)
            .sort(Self::sort_doc(sort))
            .skip(page.skip())
            .limit(i64::from(page.size))
            .await
            .map_err(|e| LodgewayError::Database(format!("find failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| LodgewayError::Database(format!("cursor failed: {}", e)))?;

        Ok(Page {
            items,
            page: page.page,
            size: page.size,
            total_count,
            total_pages: Page::total_pages_for(total_count, page.size),
        })
    }

    async fn search(&self, keyword: &str, cap: usize) -> Result<Vec<ListingDoc>> {
        let regex = substring_regex(keyword);
        let mut filter = Self::scope_filter(None);
        filter.insert(
            "$or",
            vec![
                doc! { "title": regex.clone() },
                doc! { "description": regex.clone() },
                doc! { "location": regex.clone() },
                doc! { "tags": regex },
            ],
        );

        self.listings
            .inner()
            .find(filter)
            .sort(doc! { "metadata.created_at": -1, "listing_id": 1 })
            .limit(cap as i64)
            .await
            .map_err(|e| LodgewayError::Database(format!("search failed: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| LodgewayError::Database(format!("search cursor failed: {}", e)))
    }

    async fn summarize(
        &self,
        category: Option<&str>,
        top_locations: usize,
    ) -> Result<FacetSummary> {
        let scope = Self::scope_filter(category);
        let price_field = format!("$numeric.{}", PRIMARY_NUMERIC_ATTR);

        let global = self
            .run_pipeline(vec![
                doc! { "$match": scope.clone() },
                doc! { "$group": {
                    "_id": null,
                    "min": { "$min": price_field.clone() },
                    "max": { "$max": price_field.clone() },
                }},
            ])
            .await?;
        let (price_min, price_max) = global
            .first()
            .map(|d| {
                (
                    num_field(d, "min").unwrap_or(0.0),
                    num_field(d, "max").unwrap_or(0.0),
                )
            })
            .unwrap_or((0.0, 0.0));

        let mut category_match = scope.clone();
        category_match.insert("category", doc! { "$type": "string" });
        let categories = self
            .run_pipeline(vec![
                doc! { "$match": category_match },
                doc! { "$group": {
                    "_id": "$category",
                    "count": { "$sum": 1 },
                    "avg": { "$avg": price_field.clone() },
                    "min": { "$min": price_field.clone() },
                    "max": { "$max": price_field.clone() },
                }},
            ])
            .await?;
        let per_category: BTreeMap<String, CategoryStats> = categories
            .iter()
            .filter_map(|d| {
                let name = d.get_str("_id").ok()?.to_string();
                Some((
                    name,
                    CategoryStats {
                        count: num_field(d, "count").unwrap_or(0.0) as u64,
                        avg: num_field(d, "avg").unwrap_or(0.0),
                        min: num_field(d, "min").unwrap_or(0.0),
                        max: num_field(d, "max").unwrap_or(0.0),
                    },
                ))
            })
            .collect();

        let mut location_match = scope.clone();
        location_match.insert("location", doc! { "$type": "string" });
        let locations = self
            .run_pipeline(vec![
                doc! { "$match": location_match },
                doc! { "$group": {
                    "_id": "$location",
                    "count": { "$sum": 1 },
                    "avg": { "$avg": price_field.clone() },
                }},
                // Ties break on the location string for determinism
                doc! { "$sort": { "count": -1, "_id": 1 } },
                doc! { "$limit": top_locations as i64 },
            ])
            .await?;
        let per_location: Vec<LocationCount> = locations
            .iter()
            .filter_map(|d| {
                Some(LocationCount {
                    location: d.get_str("_id").ok()?.to_string(),
                    count: num_field(d, "count").unwrap_or(0.0) as u64,
                    avg: num_field(d, "avg").unwrap_or(0.0),
                })
            })
            .collect();

        let mut distinct_values = BTreeMap::new();
        let mut categories: Vec<String> = self
            .distinct_values("category", scope.clone())
            .await?
            .into_iter()
            .filter_map(|b| b.as_str().map(str::to_string))
            .collect();
        categories.sort();
        distinct_values.insert(
            "category".to_string(),
            categories.into_iter().map(serde_json::Value::from).collect(),
        );

        let mut bedrooms: Vec<f64> = self
            .distinct_values("numeric.bedrooms", scope)
            .await?
            .into_iter()
            .filter_map(|b| match b {
                Bson::Double(v) => Some(v),
                Bson::Int32(v) => Some(f64::from(v)),
                Bson::Int64(v) => Some(v as f64),
                _ => None,
            })
            .collect();
        bedrooms.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        distinct_values.insert(
            "bedrooms".to_string(),
            bedrooms.into_iter().map(serde_json::Value::from).collect(),
        );

        Ok(FacetSummary {
            price_min,
            price_max,
            per_category,
            per_location,
            distinct_values,
        })
    }

    async fn contains_natural_key(&self, key: &str) -> Result<bool> {
        // The natural key is derived, not stored; match on its parts
        let parts: Vec<&str> = key.splitn(3, '|').collect();
        if parts.len() != 3 {
            return Ok(false);
        }
        let filter = doc! {
            "category": doc! { "$regex": format!("^{}$", regex_escape(parts[0])), "$options": "i" },
            "title": doc! { "$regex": format!("^{}$", regex_escape(parts[1])), "$options": "i" },
            "location": doc! { "$regex": format!("^{}$", regex_escape(parts[2])), "$options": "i" },
        };
        Ok(self.listings.find_one(filter).await?.is_some())
    }
}

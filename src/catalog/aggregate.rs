//! Facet and summary statistics
//!
//! Shapes for the aggregation engine plus the in-memory fold used by
//! the memory backend. Statistics are computed per stat group in one
//! pass; items missing the aggregated field are excluded from that
//! computation without failing the whole summary. An empty scope
//! produces zero sentinels, never an error.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::schemas::ListingDoc;

/// The primary numeric attribute summarized globally and per category
pub const PRIMARY_NUMERIC_ATTR: &str = "price";

/// Per-category statistics over the primary numeric attribute
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryStats {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// One entry of the top-locations facet
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationCount {
    pub location: String,
    pub count: u64,
    pub avg: f64,
}

/// Faceted statistics over a collection scope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetSummary {
    /// Minimum of the primary numeric attribute; 0 when the scope is empty
    pub price_min: f64,
    /// Maximum of the primary numeric attribute; 0 when the scope is empty
    pub price_max: f64,
    /// One entry per category value present in the data
    pub per_category: BTreeMap<String, CategoryStats>,
    /// Top-N locations by item count, ties broken lexicographically
    pub per_location: Vec<LocationCount>,
    /// Observed values for enumerable attributes
    pub distinct_values: BTreeMap<String, Vec<serde_json::Value>>,
}

#[derive(Default)]
struct NumericAccum {
    count: u64,
    price_sum: f64,
    price_count: u64,
    price_min: Option<f64>,
    price_max: Option<f64>,
}

impl NumericAccum {
    fn fold(&mut self, price: Option<f64>) {
        self.count += 1;
        if let Some(p) = price {
            self.price_sum += p;
            self.price_count += 1;
            self.price_min = Some(self.price_min.map_or(p, |m| m.min(p)));
            self.price_max = Some(self.price_max.map_or(p, |m| m.max(p)));
        }
    }

    fn avg(&self) -> f64 {
        if self.price_count == 0 {
            0.0
        } else {
            self.price_sum / self.price_count as f64
        }
    }
}

/// Compute a [`FacetSummary`] over an iterator of listings
pub fn summarize_items<'a, I>(items: I, top_locations: usize) -> FacetSummary
where
    I: IntoIterator<Item = &'a ListingDoc>,
{
    let mut global = NumericAccum::default();
    let mut per_category: BTreeMap<String, NumericAccum> = BTreeMap::new();
    let mut per_location: BTreeMap<String, NumericAccum> = BTreeMap::new();
    let mut categories: Vec<String> = Vec::new();
    let mut bedrooms: Vec<f64> = Vec::new();

    for item in items {
        let price = item.numeric.get(PRIMARY_NUMERIC_ATTR).copied();
        global.fold(price);

        if let Some(category) = &item.category {
            per_category.entry(category.clone()).or_default().fold(price);
            categories.push(category.clone());
        }
        if let Some(location) = &item.location {
            per_location.entry(location.clone()).or_default().fold(price);
        }
        if let Some(b) = item.numeric.get("bedrooms") {
            bedrooms.push(*b);
        }
    }

    let per_category = per_category
        .into_iter()
        .map(|(category, accum)| {
            (
                category,
                CategoryStats {
                    count: accum.count,
                    avg: accum.avg(),
                    min: accum.price_min.unwrap_or(0.0),
                    max: accum.price_max.unwrap_or(0.0),
                },
            )
        })
        .collect();

    let mut locations: Vec<LocationCount> = per_location
        .into_iter()
        .map(|(location, accum)| LocationCount {
            location,
            count: accum.count,
            avg: accum.avg(),
        })
        .collect();
    // Count descending, then location ascending for determinism
    locations.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.location.cmp(&b.location)));
    locations.truncate(top_locations);

    categories.sort();
    categories.dedup();
    bedrooms.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    bedrooms.dedup();

    let mut distinct_values = BTreeMap::new();
    distinct_values.insert(
        "category".to_string(),
        categories.into_iter().map(serde_json::Value::from).collect(),
    );
    distinct_values.insert(
        "bedrooms".to_string(),
        bedrooms.into_iter().map(serde_json::Value::from).collect(),
    );

    FacetSummary {
        price_min: global.price_min.unwrap_or(0.0),
        price_max: global.price_max.unwrap_or(0.0),
        per_category,
        per_location: locations,
        distinct_values,
    }
}

//! Query construction
//!
//! Translates the flat key/value parameters of a catalog request into
//! a structured predicate, sort order, and page window. Coercion is
//! explicit: a recognized parameter with a malformed value is a
//! validation error, never silently ignored, while unknown parameter
//! names are dropped. Out-of-range page numbers and sizes are clamped
//! so listing pages always render.

use std::collections::{BTreeMap, HashMap};

use crate::types::{LodgewayError, Result};

/// Numeric attributes accepted as bare equality filters and sort keys
pub const NUMERIC_ATTRS: &[&str] = &["price", "bedrooms", "rating", "students_count"];

/// An inclusive numeric range; absent bounds are unconstrained
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumericRange {
    /// Whether `value` satisfies both bounds
    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// Structured filter predicate built from raw request parameters
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Exact category match
    pub category: Option<String>,
    /// Case-insensitive location substring
    pub location: Option<String>,
    /// Inclusive ranges per numeric attribute
    pub numeric: BTreeMap<String, NumericRange>,
    /// Availability flag equality
    pub available: Option<bool>,
    /// Case-insensitive free-text substring over title/description/location/tags
    pub text: Option<String>,
    /// One listing id to drop from results ("similar items" queries)
    pub exclude_id: Option<String>,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Sort key; unknown request fields fall back to creation time
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// One of the numeric attributes
    Numeric(String),
    Title,
    CreatedAt,
}

/// Sort order for a catalog query
#[derive(Debug, Clone)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::CreatedAt,
            direction: SortDirection::Descending,
        }
    }
}

/// Clamped page window, 1-based
#[derive(Debug, Clone, Copy)]
pub struct PageSpec {
    pub page: u32,
    pub size: u32,
}

impl PageSpec {
    /// Number of items to skip before this page
    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }
}

/// Builds (criteria, sort, page) triples from raw request parameters
pub struct QueryBuilder {
    default_page_size: u32,
    max_page_size: u32,
}

impl QueryBuilder {
    pub fn new(default_page_size: u32, max_page_size: u32) -> Self {
        Self {
            default_page_size,
            max_page_size,
        }
    }

    /// Parse raw parameters into criteria, sort, and page window
    pub fn build(
        &self,
        raw: &HashMap<String, String>,
    ) -> Result<(FilterCriteria, SortSpec, PageSpec)> {
        let mut criteria = FilterCriteria {
            category: non_empty(raw.get("category")),
            location: non_empty(raw.get("location")),
            text: non_empty(raw.get("q")),
            exclude_id: non_empty(raw.get("exclude")),
            ..FilterCriteria::default()
        };

        if let Some(value) = non_empty(raw.get("available")) {
            criteria.available = Some(parse_bool("available", &value)?);
        }

        for (key, value) in raw {
            if value.is_empty() {
                continue;
            }
            if let Some(attr) = key.strip_prefix("min_") {
                if !attr.is_empty() {
                    criteria.numeric.entry(attr.to_string()).or_default().min =
                        Some(parse_number(key, value)?);
                }
            } else if let Some(attr) = key.strip_prefix("max_") {
                if !attr.is_empty() {
                    criteria.numeric.entry(attr.to_string()).or_default().max =
                        Some(parse_number(key, value)?);
                }
            } else if NUMERIC_ATTRS.contains(&key.as_str()) {
                // Bare equality, e.g. bedrooms=2
                let n = parse_number(key, value)?;
                criteria.numeric.insert(
                    key.clone(),
                    NumericRange {
                        min: Some(n),
                        max: Some(n),
                    },
                );
            }
        }

        let sort = self.build_sort(raw)?;
        let page = self.build_page(raw)?;

        Ok((criteria, sort, page))
    }

    fn build_sort(&self, raw: &HashMap<String, String>) -> Result<SortSpec> {
        let key = match non_empty(raw.get("sort")).as_deref() {
            None => return Ok(SortSpec::default()),
            Some("title") => SortKey::Title,
            Some("created_at") | Some("createdAt") => SortKey::CreatedAt,
            Some(name) if NUMERIC_ATTRS.contains(&name) => SortKey::Numeric(name.to_string()),
            // Unknown sort fields fall back to creation time so the
            // page stays renderable
            Some(_) => return Ok(SortSpec::default()),
        };

        let direction = match non_empty(raw.get("order")).as_deref() {
            None | Some("asc") | Some("ascending") => SortDirection::Ascending,
            Some("desc") | Some("descending") => SortDirection::Descending,
            Some(other) => {
                return Err(LodgewayError::Validation(format!(
                    "invalid sort order: {}",
                    other
                )))
            }
        };

        Ok(SortSpec { key, direction })
    }

    fn build_page(&self, raw: &HashMap<String, String>) -> Result<PageSpec> {
        let page = match non_empty(raw.get("page")) {
            None => 1,
            Some(v) => v
                .parse::<i64>()
                .map_err(|_| LodgewayError::Validation(format!("invalid page number: {}", v)))?
                .clamp(1, i64::from(u32::MAX)) as u32,
        };

        let size = match non_empty(raw.get("limit")) {
            None => self.default_page_size,
            Some(v) => {
                let requested = v
                    .parse::<i64>()
                    .map_err(|_| LodgewayError::Validation(format!("invalid page size: {}", v)))?;
                requested.clamp(1, i64::from(self.max_page_size)) as u32
            }
        };

        Ok(PageSpec { page, size })
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| {
            LodgewayError::Validation(format!("parameter {} is not a number: {}", key, value))
        })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(LodgewayError::Validation(format!(
            "parameter {} is not a boolean: {}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(10, 100)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_params_use_defaults() {
        let (criteria, sort, page) = builder().build(&HashMap::new()).unwrap();

        assert!(criteria.category.is_none());
        assert!(criteria.numeric.is_empty());
        assert_eq!(sort.key, SortKey::CreatedAt);
        assert_eq!(sort.direction, SortDirection::Descending);
        assert_eq!(page.page, 1);
        assert_eq!(page.size, 10);
    }

    #[test]
    fn test_numeric_range_pairs() {
        let raw = params(&[("min_price", "150"), ("max_price", "250"), ("min_rating", "4")]);
        let (criteria, _, _) = builder().build(&raw).unwrap();

        let price = &criteria.numeric["price"];
        assert_eq!(price.min, Some(150.0));
        assert_eq!(price.max, Some(250.0));
        assert_eq!(criteria.numeric["rating"].min, Some(4.0));
        assert_eq!(criteria.numeric["rating"].max, None);
    }

    #[test]
    fn test_bare_numeric_is_equality() {
        let raw = params(&[("bedrooms", "2")]);
        let (criteria, _, _) = builder().build(&raw).unwrap();

        let range = &criteria.numeric["bedrooms"];
        assert_eq!(range.min, Some(2.0));
        assert_eq!(range.max, Some(2.0));
        assert!(range.contains(2.0));
        assert!(!range.contains(3.0));
    }

    #[test]
    fn test_non_numeric_value_is_validation_error() {
        let raw = params(&[("min_price", "cheap")]);
        assert!(matches!(
            builder().build(&raw).unwrap_err(),
            LodgewayError::Validation(_)
        ));

        let raw = params(&[("bedrooms", "two")]);
        assert!(builder().build(&raw).is_err());
    }

    #[test]
    fn test_unknown_sort_field_falls_back() {
        let raw = params(&[("sort", "popularity"), ("order", "desc")]);
        let (_, sort, _) = builder().build(&raw).unwrap();
        assert_eq!(sort.key, SortKey::CreatedAt);
        assert_eq!(sort.direction, SortDirection::Descending);
    }

    #[test]
    fn test_known_sort_fields() {
        let raw = params(&[("sort", "price"), ("order", "desc")]);
        let (_, sort, _) = builder().build(&raw).unwrap();
        assert_eq!(sort.key, SortKey::Numeric("price".to_string()));
        assert_eq!(sort.direction, SortDirection::Descending);

        let raw = params(&[("sort", "title")]);
        let (_, sort, _) = builder().build(&raw).unwrap();
        assert_eq!(sort.key, SortKey::Title);
        assert_eq!(sort.direction, SortDirection::Ascending);
    }

    #[test]
    fn test_invalid_order_is_validation_error() {
        let raw = params(&[("sort", "price"), ("order", "sideways")]);
        assert!(builder().build(&raw).is_err());
    }

    #[test]
    fn test_page_clamping() {
        let raw = params(&[("page", "0"), ("limit", "0")]);
        let (_, _, page) = builder().build(&raw).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.size, 1);

        let raw = params(&[("page", "-3"), ("limit", "5000")]);
        let (_, _, page) = builder().build(&raw).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.size, 100);

        let raw = params(&[("page", "7"), ("limit", "25")]);
        let (_, _, page) = builder().build(&raw).unwrap();
        assert_eq!(page.page, 7);
        assert_eq!(page.size, 25);
        assert_eq!(page.skip(), 150);
    }

    #[test]
    fn test_non_numeric_page_is_validation_error() {
        let raw = params(&[("page", "first")]);
        assert!(builder().build(&raw).is_err());
    }

    #[test]
    fn test_flag_and_exclusion_filters() {
        let raw = params(&[("available", "true"), ("exclude", "L-1"), ("q", "river view")]);
        let (criteria, _, _) = builder().build(&raw).unwrap();

        assert_eq!(criteria.available, Some(true));
        assert_eq!(criteria.exclude_id.as_deref(), Some("L-1"));
        assert_eq!(criteria.text.as_deref(), Some("river view"));

        let raw = params(&[("available", "maybe")]);
        assert!(builder().build(&raw).is_err());
    }

    #[test]
    fn test_blank_values_are_absent() {
        let raw = params(&[("category", "  "), ("min_price", "")]);
        let (criteria, _, _) = builder().build(&raw).unwrap();
        assert!(criteria.category.is_none());
        assert!(criteria.numeric.is_empty());
    }
}

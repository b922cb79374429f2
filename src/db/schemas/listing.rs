//! Listing document schema
//!
//! One collection holds both housing units and establishments; the
//! `category` field discriminates. Every field is optional on read —
//! documents written by older importers may miss any of them. Numeric
//! attributes (price, bedrooms, rating, students_count, ...) live in an
//! open map rather than fixed columns, and `extra` carries whatever
//! else an importer attached.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for listings
pub const LISTING_COLLECTION: &str = "listings";

/// Listing document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ListingDoc {
    /// Application-level listing id (UUID), unique
    pub listing_id: String,

    /// Common metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Category discriminator (e.g. "apartment", "dorm", "university")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Display title or name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Free-text description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-text location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Numeric attributes (price, bedrooms, rating, students_count, ...)
    #[serde(default)]
    pub numeric: BTreeMap<String, f64>,

    /// Availability flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,

    /// Amenity / program tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Ordered blob ids of attached images
    #[serde(default)]
    pub image_refs: Vec<String>,

    /// Open key/value bag for fields the schema does not model
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ListingDoc {
    /// Created-at timestamp in epoch milliseconds, if set
    pub fn created_at_millis(&self) -> Option<i64> {
        self.metadata.created_at.map(|d| d.timestamp_millis())
    }
}

impl IntoIndexes for ListingDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "listing_id": 1 },
                Some(IndexOptions::builder().unique(true).build()),
            ),
            (doc! { "category": 1 }, None),
            (doc! { "numeric.price": 1 }, None),
        ]
    }
}

impl MutMetadata for ListingDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

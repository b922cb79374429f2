//! Database schemas for Lodgeway
//!
//! Defines MongoDB document structures for listings and media blobs.

mod listing;
mod metadata;

pub use listing::{ListingDoc, LISTING_COLLECTION};
pub use metadata::Metadata;

//! Price Tracker - marketplace search-results crawler
//!
//! Queries marketplace search pages, extracts and normalizes product
//! listings, optionally enriches them with review comments, and bulk-indexes
//! one time-stamped record per extraction into an analytics store.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

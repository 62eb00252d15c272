//! Context handed to the parsers for one page.

use chrono::{DateTime, Utc};

use crate::domain::product::SearchQuery;

/// Context for one listing page
#[derive(Debug, Clone)]
pub struct ListingContext {
    /// Query that produced the page
    pub query: SearchQuery,

    /// Base URL for resolving relative links
    pub site_url: String,

    /// Timestamp stamped on every record of this page
    pub extracted_at: DateTime<Utc>,

    /// Cards considered; `None` takes all
    pub max_items: Option<usize>,

    /// Drop cards without a price
    pub require_price: bool,
}

impl ListingContext {
    pub fn new(query: SearchQuery, site_url: impl Into<String>) -> Self {
        Self {
            query,
            site_url: site_url.into(),
            extracted_at: Utc::now(),
            max_items: None,
            require_price: false,
        }
    }

    #[must_use]
    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    #[must_use]
    pub fn with_require_price(mut self, require_price: bool) -> Self {
        self.require_price = require_price;
        self
    }

    #[must_use]
    pub fn at(mut self, extracted_at: DateTime<Utc>) -> Self {
        self.extracted_at = extracted_at;
        self
    }
}

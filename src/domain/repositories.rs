//! Storage interfaces for the crawl pipeline.
//!
//! The analytics store and the product catalog are external collaborators;
//! the pipeline only sees these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::CatalogItem;
use super::product::ProductRecord;

/// Upper bound on documents returned by one range query
pub const MAX_RANGE_QUERY_SIZE: usize = 1000;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("store unreachable: {message}")]
    Transport { message: String },

    #[error("store rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unexpected store response: {message}")]
    InvalidResponse { message: String },

    #[error("document has no identifier")]
    MissingIdentifier,

    #[error("CSV output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("output file error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport { message: err.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("catalog row {id} is malformed: {reason}")]
    MalformedRow { id: i64, reason: String },
}

/// Per-call result of a bulk upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub succeeded: usize,
    pub failed: usize,
    /// First few per-document error messages
    pub errors: Vec<String>,
}

/// Time-range read against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    /// Full-text match on the title
    pub title: Option<String>,
    /// Exact origin search term
    pub search_term: Option<String>,
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
    pub size: usize,
}

impl RangeQuery {
    pub fn last_days(days: u32) -> Self {
        Self {
            title: None,
            search_term: None,
            since: Utc::now() - chrono::Duration::days(i64::from(days)),
            until: None,
            size: MAX_RANGE_QUERY_SIZE,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// Whether a record falls inside this query.
    pub fn matches(&self, record: &ProductRecord) -> bool {
        if record.timestamp < self.since {
            return false;
        }
        if self.until.is_some_and(|until| record.timestamp > until) {
            return false;
        }
        if let Some(term) = &self.search_term {
            if !record.search_term.eq_ignore_ascii_case(term) {
                return false;
            }
        }
        if let Some(title) = &self.title {
            let haystack = record.title.to_lowercase();
            if !title.to_lowercase().split_whitespace().any(|w| haystack.contains(w)) {
                return false;
            }
        }
        true
    }
}

/// Analytics store holding one document per extraction event.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Writes every record under its identifier, overwriting existing ones.
    async fn bulk_upsert(&self, records: &[ProductRecord]) -> Result<BulkResponse, IndexError>;

    /// Records inside the range, oldest first.
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<ProductRecord>, IndexError>;
}

/// Source of catalog items driving catalog-mode runs.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn active_items(&self) -> Result<Vec<CatalogItem>, CatalogError>;
}

//! Domain module - records, catalog items, run lifecycle and storage traits
//!
//! Nothing in here performs I/O; infrastructure implements the traits in
//! [`repositories`].

pub mod catalog;
pub mod crawl_run;
pub mod product;
pub mod repositories;
pub mod title_analysis;

pub use catalog::CatalogItem;
pub use crawl_run::{CrawlBatch, CrawlStatus, IndexOutcome, RunReport, TermSummary};
pub use product::{ProductRecord, SearchQuery};
pub use repositories::{
    BulkResponse, CatalogError, CatalogSource, DocumentStore, IndexError, RangeQuery,
};

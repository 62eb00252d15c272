//! Infrastructure layer: configuration, logging, HTTP fetching, HTML parsing
//! and the store/catalog adapters behind the domain traits.

pub mod catalog_repository;
pub mod config;
pub mod csv_sink;
pub mod database_connection;
pub mod document_store;
pub mod http_client;
pub mod logging;
pub mod parsing;

// Re-export commonly used items
pub use catalog_repository::{InMemoryCatalog, SqliteCatalogSource};
pub use config::{AppConfig, ConfigError};
pub use csv_sink::CsvDocumentStore;
pub use database_connection::DatabaseConnection;
pub use document_store::{ElasticsearchStore, InMemoryDocumentStore};
pub use http_client::{FetchError, HttpClient, HttpClientConfig, PageSource, search_url};
pub use logging::init_logging;
pub use parsing::{
    DetailParser, ListingContext, ListingParser, ParsingError, ParsingResult, SelectorConfig,
};

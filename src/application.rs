//! Application layer
//!
//! Use cases that drive the domain through the infrastructure adapters:
//! crawling, enrichment, indexing and evaluation.

pub mod batch_indexer;
pub mod crawl_orchestrator;
pub mod detail_enricher;
pub mod result_evaluator;

pub use batch_indexer::BatchIndexer;
pub use crawl_orchestrator::{CrawlOrchestrator, CrawlRun};
pub use detail_enricher::{DetailEnricher, Enrichment, EnrichmentOutcome};
pub use result_evaluator::{AggregateStats, PricePoint, ResultEvaluator};

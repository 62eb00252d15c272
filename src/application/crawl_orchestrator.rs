//! Crawl orchestration: fetch, parse, extract and enrich every term, then
//! hand the batch to the indexer.
//!
//! Per-term failures are recorded in the term's summary and never stop the
//! run. Ordering of records follows the order of the input terms in both
//! concurrency modes.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::catalog::active_queries;
use crate::domain::{
    CatalogError, CatalogSource, CrawlBatch, CrawlStatus, DocumentStore, IndexOutcome,
    ProductRecord, RunReport, SearchQuery, TermSummary,
};
use crate::infrastructure::config::{AppConfig, ConcurrencyMode};
use crate::infrastructure::http_client::{FetchError, PageSource, search_url};
use crate::infrastructure::parsing::{DetailParser, ListingContext, ListingParser, ParsingResult};

use super::batch_indexer::BatchIndexer;
use super::detail_enricher::{DetailEnricher, EnrichmentOutcome};

/// Records and report of one finished run
#[derive(Debug, Clone)]
pub struct CrawlRun {
    pub batch: CrawlBatch,
    pub report: RunReport,
}

struct TermResult {
    summary: TermSummary,
    records: Vec<ProductRecord>,
    /// Listing fetch was interrupted; nothing from this term is kept
    cancelled: bool,
}

/// Status holder that refuses illegal transitions.
struct RunStatus(CrawlStatus);

impl RunStatus {
    fn advance(&mut self, next: CrawlStatus) {
        if self.0.can_transition_to(next) {
            debug!("Run status {:?} -> {:?}", self.0, next);
            self.0 = next;
        } else {
            error!("Illegal run status transition {:?} -> {:?} ignored", self.0, next);
        }
    }
}

pub struct CrawlOrchestrator {
    config: Arc<AppConfig>,
    source: Arc<dyn PageSource>,
    parser: ListingParser,
    enricher: DetailEnricher,
    indexer: BatchIndexer,
}

impl CrawlOrchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        source: Arc<dyn PageSource>,
        store: Arc<dyn DocumentStore>,
    ) -> ParsingResult<Self> {
        let parser = ListingParser::with_config(&config.selectors)?;
        let detail_parser = DetailParser::with_config(&config.selectors)?;
        let enricher = DetailEnricher::new(source.clone(), detail_parser);
        let indexer = BatchIndexer::new(store, config.store.bulk_chunk_size);
        Ok(Self { config, source, parser, enricher, indexer })
    }

    /// Ad hoc run for one free-text term.
    pub async fn run_term(&self, term: &str, cancel: &CancellationToken) -> CrawlRun {
        self.run(vec![SearchQuery::ad_hoc(term.trim())], cancel).await
    }

    /// Run over every active catalog item.
    pub async fn run_catalog(
        &self,
        catalog: &dyn CatalogSource,
        cancel: &CancellationToken,
    ) -> Result<CrawlRun, CatalogError> {
        let items = catalog.active_items().await?;
        let queries = active_queries(&items);
        info!("Catalog run over {} active items ({} loaded)", queries.len(), items.len());
        Ok(self.run(queries, cancel).await)
    }

    /// Runs all queries, indexes the batch and reports.
    pub async fn run(&self, queries: Vec<SearchQuery>, cancel: &CancellationToken) -> CrawlRun {
        let mut status = RunStatus(CrawlStatus::Idle);
        let mut batch = CrawlBatch::new();
        status.advance(CrawlStatus::Running);
        info!(
            run_id = %batch.run_id,
            terms = queries.len(),
            mode = ?self.config.crawl.concurrency,
            "Starting crawl run"
        );

        let completed = match self.config.crawl.concurrency {
            ConcurrencyMode::Sequential => {
                self.collect_sequential(queries, &mut batch, cancel).await
            }
            ConcurrencyMode::Concurrent => {
                self.collect_concurrent(queries, &mut batch, cancel).await
            }
        };
        batch.finished_at = Some(chrono::Utc::now());

        let index = if completed {
            status.advance(CrawlStatus::Indexing);
            let index = self.indexer.index(batch.records.clone()).await;
            let clean =
                matches!(index, IndexOutcome::Skipped | IndexOutcome::Indexed { failed: 0, .. });
            let failed = batch.has_failures() || !clean;
            status.advance(if failed { CrawlStatus::PartiallyFailed } else { CrawlStatus::Done });
            index
        } else {
            warn!(records = batch.records.len(), "Run cancelled, flushing collected records");
            let index = self.indexer.index(batch.records.clone()).await;
            status.advance(CrawlStatus::Cancelled);
            index
        };

        let report = RunReport::from_batch(&batch, status.0, index);
        info!(
            run_id = %report.run_id,
            status = ?report.status,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Crawl run finished"
        );
        CrawlRun { batch, report }
    }

    /// One term at a time with a pause in between. Returns false when cancelled.
    async fn collect_sequential(
        &self,
        queries: Vec<SearchQuery>,
        batch: &mut CrawlBatch,
        cancel: &CancellationToken,
    ) -> bool {
        let total = queries.len();
        for (position, query) in queries.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return false;
            }
            let result = self.collect_term(query, 1, cancel).await;
            if result.cancelled {
                return false;
            }
            batch.push_term(result.summary, result.records);

            if position + 1 < total && !self.pause(cancel).await {
                return false;
            }
        }
        !cancel.is_cancelled()
    }

    /// Terms in parallel, results consumed in input order.
    async fn collect_concurrent(
        &self,
        queries: Vec<SearchQuery>,
        batch: &mut CrawlBatch,
        cancel: &CancellationToken,
    ) -> bool {
        let term_limit = self.config.crawl.max_concurrent_terms.max(1);
        let enrich_limit = self.config.crawl.max_concurrent_enrichments.max(1);

        let mut results = stream::iter(queries)
            .map(|query| self.collect_term(query, enrich_limit, cancel))
            .buffered(term_limit);

        let mut completed = true;
        while let Some(result) = results.next().await {
            if result.cancelled {
                completed = false;
                continue;
            }
            batch.push_term(result.summary, result.records);
        }
        completed && !cancel.is_cancelled()
    }

    /// Sleeps the inter-term delay. Returns false if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        let jitter = match self.config.crawl.jitter_ms {
            0 => 0,
            max => fastrand::u64(0..=max),
        };
        let delay = Duration::from_millis(self.config.crawl.request_delay_ms + jitter);
        if delay.is_zero() {
            return true;
        }
        debug!("Waiting {:?} before next term", delay);
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = cancel.cancelled() => false,
        }
    }

    async fn collect_term(
        &self,
        query: SearchQuery,
        enrich_limit: usize,
        cancel: &CancellationToken,
    ) -> TermResult {
        let mut summary = TermSummary { term: query.term.clone(), ..TermSummary::default() };
        let unreachable = |mut summary: TermSummary| {
            summary.unreachable = true;
            TermResult { summary, records: Vec::new(), cancelled: false }
        };

        let url = match search_url(&self.config.marketplace.base_url, &query.term) {
            Ok(url) => url,
            Err(e) => {
                warn!(term = %query.term, error = %e, "Could not build listing URL");
                return unreachable(summary);
            }
        };

        let markup = match self.source.fetch(&url, cancel).await {
            Ok(markup) => markup,
            Err(FetchError::Cancelled { .. }) => {
                return TermResult { summary, records: Vec::new(), cancelled: true };
            }
            Err(e) => {
                warn!(
                    term = %query.term,
                    url = %url,
                    error = %e,
                    "Listing page unreachable, skipping term"
                );
                return unreachable(summary);
            }
        };

        let context = ListingContext::new(query, self.config.marketplace.site_url.clone())
            .with_max_items(self.config.marketplace.max_listings_per_term)
            .with_require_price(self.config.crawl.require_price);
        let page = self.parser.parse_listing(&markup, &context);

        summary.container_found = page.container_found;
        summary.attempted = page.cards_seen;
        summary.succeeded = page.records.len();
        summary.failed = page.discarded.len();
        summary.with_price = page.records.iter().filter(|r| r.price.is_some()).count();
        summary.with_rating = page.records.iter().filter(|r| r.rating.is_some()).count();
        for discarded in &page.discarded {
            debug!(term = %summary.term, reason = %discarded, "Listing card discarded");
        }

        let records = if self.config.crawl.enrich_details && !page.records.is_empty() {
            let (records, outcomes) =
                self.enricher.enrich_all(page.records, enrich_limit, cancel).await;
            summary.enrichment_failures =
                outcomes.iter().filter(|o| **o == EnrichmentOutcome::Failed).count();
            records
        } else {
            page.records
        };

        info!(
            term = %summary.term,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            with_price = summary.with_price,
            "Term collected"
        );
        TermResult { summary, records, cancelled: false }
    }
}

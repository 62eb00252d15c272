//! Review comment enrichment from product detail pages.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::ProductRecord;
use crate::infrastructure::http_client::{FetchError, PageSource};
use crate::infrastructure::parsing::DetailParser;

/// How enrichment went for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// Detail page fetched and parsed (comment list may still be empty)
    Enriched,
    /// Record already carried comments from its listing card
    Skipped,
    /// Detail page could not be fetched; comments left empty
    Failed,
    /// Run was cancelled before the fetch finished
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub comments: Vec<String>,
    pub outcome: EnrichmentOutcome,
}

/// Fetches detail pages and collects their review comments
pub struct DetailEnricher {
    source: Arc<dyn PageSource>,
    parser: DetailParser,
}

impl DetailEnricher {
    pub fn new(source: Arc<dyn PageSource>, parser: DetailParser) -> Self {
        Self { source, parser }
    }

    /// Comments from the page at `link`. A fetch failure yields an empty list.
    pub async fn comments_for(&self, link: &str, cancel: &CancellationToken) -> Enrichment {
        match self.source.fetch(link, cancel).await {
            Ok(markup) => {
                let comments = self.parser.parse_comments(&markup);
                debug!(url = %link, count = comments.len(), "Collected detail comments");
                Enrichment { comments, outcome: EnrichmentOutcome::Enriched }
            }
            Err(FetchError::Cancelled { .. }) => Enrichment {
                comments: Vec::new(),
                outcome: EnrichmentOutcome::Cancelled,
            },
            Err(e) => {
                warn!(
                    url = %link,
                    error = %e,
                    "Detail enrichment failed, keeping record without comments"
                );
                Enrichment { comments: Vec::new(), outcome: EnrichmentOutcome::Failed }
            }
        }
    }

    /// Fills in comments unless the record already has some.
    pub async fn enrich(
        &self,
        record: ProductRecord,
        cancel: &CancellationToken,
    ) -> (ProductRecord, EnrichmentOutcome) {
        if !record.comments.is_empty() {
            return (record, EnrichmentOutcome::Skipped);
        }
        let enrichment = self.comments_for(&record.link, cancel).await;
        (record.with_comments(enrichment.comments), enrichment.outcome)
    }

    /// Enriches records with at most `limit` detail fetches in flight.
    ///
    /// Output order matches input order.
    pub async fn enrich_all(
        &self,
        records: Vec<ProductRecord>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> (Vec<ProductRecord>, Vec<EnrichmentOutcome>) {
        stream::iter(records)
            .map(|record| self.enrich(record, cancel))
            .buffered(limit.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .unzip()
    }
}

//! Run lifecycle: status machine, batch accumulation and the final report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::ProductRecord;

/// Overall status of one orchestration run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// Nothing started yet
    Idle,
    /// Terms are being fetched and extracted
    Running,
    /// The batch is being written to the store
    Indexing,
    /// Every term and item succeeded
    Done,
    /// Finished, but some terms, items or documents failed
    PartiallyFailed,
    /// Interrupted; whatever was collected was flushed best-effort
    Cancelled,
}

impl CrawlStatus {
    pub const fn can_transition_to(self, next: Self) -> bool {
        use CrawlStatus::{Cancelled, Done, Idle, Indexing, PartiallyFailed, Running};
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Indexing | PartiallyFailed | Cancelled)
                | (Indexing, Done | PartiallyFailed | Cancelled)
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::PartiallyFailed | Self::Cancelled)
    }
}

/// Per-term counters, kept so a sudden drop in extracted fields shows up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSummary {
    pub term: String,
    /// Listing page could not be fetched at all
    pub unreachable: bool,
    /// Results container was located on the page
    pub container_found: bool,
    /// Listing cards seen on the page
    pub attempted: usize,
    /// Cards that produced a record
    pub succeeded: usize,
    /// Cards discarded during extraction
    pub failed: usize,
    pub with_price: usize,
    pub with_rating: usize,
    pub enrichment_failures: usize,
}

/// Records from one run plus its metadata. Lives only for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlBatch {
    pub run_id: Uuid,
    pub records: Vec<ProductRecord>,
    pub terms: Vec<TermSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CrawlBatch {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            records: Vec::new(),
            terms: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Appends one term's records, keeping term order.
    pub fn push_term(&mut self, summary: TermSummary, records: Vec<ProductRecord>) {
        self.terms.push(summary);
        self.records.extend(records);
    }

    pub fn attempted(&self) -> usize {
        self.terms.iter().map(|t| t.attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.terms.iter().map(|t| t.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.terms.iter().map(|t| t.failed).sum()
    }

    pub fn unreachable_terms(&self) -> usize {
        self.terms.iter().filter(|t| t.unreachable).count()
    }

    pub fn enrichment_failures(&self) -> usize {
        self.terms.iter().map(|t| t.enrichment_failures).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0 || self.unreachable_terms() > 0
    }
}

impl Default for CrawlBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of handing a batch to the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// Nothing to write
    Skipped,
    Indexed {
        indexed: usize,
        failed: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        errors: Vec<String>,
    },
    /// The bulk call itself failed
    Failed { attempted: usize, reason: String },
}

impl IndexOutcome {
    pub const fn failed_documents(&self) -> usize {
        match self {
            Self::Skipped => 0,
            Self::Indexed { failed, .. } => *failed,
            Self::Failed { attempted, .. } => *attempted,
        }
    }
}

/// What an operator sees after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: CrawlStatus,
    pub terms: Vec<TermSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unreachable_terms: usize,
    pub enrichment_failures: usize,
    pub index: IndexOutcome,
}

impl RunReport {
    pub fn from_batch(batch: &CrawlBatch, status: CrawlStatus, index: IndexOutcome) -> Self {
        Self {
            run_id: batch.run_id,
            status,
            terms: batch.terms.clone(),
            started_at: batch.started_at,
            finished_at: batch.finished_at.unwrap_or_else(Utc::now),
            attempted: batch.attempted(),
            succeeded: batch.succeeded(),
            failed: batch.failed(),
            unreachable_terms: batch.unreachable_terms(),
            enrichment_failures: batch.enrichment_failures(),
            index,
        }
    }
}

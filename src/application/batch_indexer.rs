//! Bulk indexing of a crawl batch into the document store.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::{DocumentStore, IndexError, IndexOutcome, ProductRecord};

/// Writes batches through a shared store handle, one bulk call at a time
pub struct BatchIndexer {
    store: Arc<dyn DocumentStore>,
    chunk_size: usize,
    bulk_gate: Mutex<()>,
}

impl BatchIndexer {
    pub fn new(store: Arc<dyn DocumentStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            bulk_gate: Mutex::new(()),
        }
    }

    /// Assigns missing identifiers and drops records that must never be
    /// stored (title too short).
    pub fn prepare(records: Vec<ProductRecord>) -> Vec<ProductRecord> {
        records
            .into_iter()
            .filter(|record| {
                let keep = record.has_valid_title();
                if !keep {
                    warn!(
                        title = %record.title,
                        "Dropping record with invalid title before indexing"
                    );
                }
                keep
            })
            .map(|mut record| {
                if record.id.as_deref().is_none_or(str::is_empty) {
                    record.id = Some(record.derived_id());
                }
                record
            })
            .collect()
    }

    /// Upserts `records`. Per-document failures are counted, never retried.
    pub async fn index(&self, records: Vec<ProductRecord>) -> IndexOutcome {
        let records = Self::prepare(records);
        if records.is_empty() {
            info!("No records to index, skipping bulk write");
            return IndexOutcome::Skipped;
        }

        let _guard = self.bulk_gate.lock().await;
        let mut indexed = 0;
        let mut failed = 0;
        let mut errors = Vec::new();

        for (position, chunk) in records.chunks(self.chunk_size).enumerate() {
            match self.store.bulk_upsert(chunk).await {
                Ok(response) => {
                    indexed += response.succeeded;
                    failed += response.failed;
                    errors.extend(response.errors);
                }
                // an unreachable store will not take the remaining chunks either
                Err(e @ IndexError::Transport { .. }) if indexed == 0 && failed == 0 => {
                    error!(error = %e, "Store unreachable, bulk write abandoned");
                    return IndexOutcome::Failed { attempted: records.len(), reason: e.to_string() };
                }
                Err(e) => {
                    error!(chunk = position, error = %e, "Bulk write failed for chunk");
                    failed += chunk.len();
                    errors.push(e.to_string());
                }
            }
        }

        info!(indexed, failed, "Bulk indexing finished");
        IndexOutcome::Indexed { indexed, failed, errors }
    }
}

//! CSV sink
//!
//! Appends one row per record to a local file using the store document
//! schema. Reading the file back keeps the last row per id, so re-indexing a
//! record behaves like an upsert for every reader.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::repositories::MAX_RANGE_QUERY_SIZE;
use crate::domain::{BulkResponse, DocumentStore, IndexError, ProductRecord, RangeQuery};

const MAX_REPORTED_ERRORS: usize = 5;

/// One CSV line. `comments` holds a JSON array so separators inside
/// comments survive the round trip.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    id: String,
    title: String,
    price: Option<f64>,
    old_price: Option<f64>,
    discount_percent: Option<u8>,
    link: String,
    seller: Option<String>,
    is_official_store: bool,
    is_authorized_seller: Option<bool>,
    rating: Option<f64>,
    review_count: u32,
    comments: String,
    free_shipping: bool,
    is_international: bool,
    is_full: bool,
    location: Option<String>,
    is_original: bool,
    is_remanufactured: bool,
    cartridge_model: Option<String>,
    part_number: Option<String>,
    search_term: String,
    catalog_item_id: Option<i64>,
    catalog_pn: Option<String>,
    timestamp: DateTime<Utc>,
}

impl CsvRow {
    fn from_record(record: &ProductRecord) -> Result<Self, IndexError> {
        let id = record.id.clone().ok_or(IndexError::MissingIdentifier)?;
        Ok(Self {
            id,
            title: record.title.clone(),
            price: record.price,
            old_price: record.old_price,
            discount_percent: record.discount_percent,
            link: record.link.clone(),
            seller: record.seller.clone(),
            is_official_store: record.is_official_store,
            is_authorized_seller: record.is_authorized_seller,
            rating: record.rating,
            review_count: record.review_count,
            comments: serde_json::to_string(&record.comments)?,
            free_shipping: record.free_shipping,
            is_international: record.is_international,
            is_full: record.is_full,
            location: record.location.clone(),
            is_original: record.is_original,
            is_remanufactured: record.is_remanufactured,
            cartridge_model: record.cartridge_model.clone(),
            part_number: record.part_number.clone(),
            search_term: record.search_term.clone(),
            catalog_item_id: record.catalog_item_id,
            catalog_pn: record.catalog_pn.clone(),
            timestamp: record.timestamp,
        })
    }

    fn into_record(self) -> Result<ProductRecord, IndexError> {
        let comments = if self.comments.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.comments)?
        };
        let mut record = ProductRecord::new(self.title, self.link, self.search_term, self.timestamp)
            .with_price(self.price)
            .with_comments(comments);
        record.id = Some(self.id);
        record.old_price = self.old_price;
        record.discount_percent = self.discount_percent;
        record.seller = self.seller;
        record.is_official_store = self.is_official_store;
        record.is_authorized_seller = self.is_authorized_seller;
        record.rating = self.rating;
        record.review_count = self.review_count;
        record.free_shipping = self.free_shipping;
        record.is_international = self.is_international;
        record.is_full = self.is_full;
        record.location = self.location;
        record.is_original = self.is_original;
        record.is_remanufactured = self.is_remanufactured;
        record.cartridge_model = self.cartridge_model;
        record.part_number = self.part_number;
        record.catalog_item_id = self.catalog_item_id;
        record.catalog_pn = self.catalog_pn;
        Ok(record)
    }
}

/// Document store writing to a CSV file
pub struct CsvDocumentStore {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvDocumentStore {
    /// Opens `path` for appending, creating it and its directory if needed.
    ///
    /// The header row is written only into an empty file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new().has_headers(is_new).from_writer(file);

        info!("CSV sink writing to {}", path.display());
        Ok(Self { path, writer: Mutex::new(writer) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows in the file, last write per id.
    fn read_documents(&self) -> Result<IndexMap<String, ProductRecord>, IndexError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut documents = IndexMap::new();
        for row in reader.deserialize::<CsvRow>() {
            match row.map_err(IndexError::from).and_then(CsvRow::into_record) {
                Ok(record) => {
                    if let Some(id) = record.id.clone() {
                        documents.insert(id, record);
                    }
                }
                Err(e) => warn!("Skipping unreadable CSV row in {}: {}", self.path.display(), e),
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl DocumentStore for CsvDocumentStore {
    async fn bulk_upsert(&self, records: &[ProductRecord]) -> Result<BulkResponse, IndexError> {
        let mut writer = self.writer.lock().await;
        let mut outcome = BulkResponse::default();

        for record in records {
            let written = CsvRow::from_record(record)
                .and_then(|row| writer.serialize(row).map_err(IndexError::from));
            match written {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => {
                    outcome.failed += 1;
                    if outcome.errors.len() < MAX_REPORTED_ERRORS {
                        let id = record.id.as_deref().unwrap_or("?");
                        outcome.errors.push(format!("{id}: {e}"));
                    }
                }
            }
        }
        writer.flush()?;

        debug!("Appended {} rows to {}", outcome.succeeded, self.path.display());
        Ok(outcome)
    }

    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<ProductRecord>, IndexError> {
        // pending rows must be on disk before reading
        let mut writer = self.writer.lock().await;
        writer.flush()?;
        let documents = self.read_documents()?;
        drop(writer);

        let mut records: Vec<ProductRecord> =
            documents.into_values().filter(|r| query.matches(r)).collect();
        records.sort_by_key(|r| r.timestamp);
        records.truncate(query.size.min(MAX_RANGE_QUERY_SIZE));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(title: &str, at: DateTime<Utc>) -> ProductRecord {
        let link = "https://produto.mercadolivre.com.br/MLB-1";
        let mut record = ProductRecord::new(title, link, "hp 664", at)
            .with_price(Some(74.9))
            .with_comments(vec![
                "Ótimo, chegou rápido".to_string(),
                "Tinta boa | recomendo".to_string(),
            ]);
        record.seller = Some("Loja Oficial HP".to_string());
        record.is_original = true;
        record.id = Some(record.derived_id());
        record
    }

    #[tokio::test]
    async fn writes_header_once_and_one_row_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("prices.csv");
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();

        let store = CsvDocumentStore::create(&path).unwrap();
        store.bulk_upsert(&[record("Cartucho HP 664 Preto", at)]).await.unwrap();
        drop(store);

        let reopened = CsvDocumentStore::create(&path).unwrap();
        let outcome = reopened
            .bulk_upsert(&[record("Cartucho HP 664 Preto", at + Duration::hours(1))])
            .await
            .unwrap();
        assert_eq!(outcome.succeeded, 1);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,title,price,"));
        assert_eq!(contents.matches("id,title,price,").count(), 1);
    }

    #[tokio::test]
    async fn reads_back_records_with_last_write_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDocumentStore::create(dir.path().join("prices.csv")).unwrap();
        let now = Utc::now();
        let first = record("Cartucho HP 664 Preto", now - Duration::hours(2));
        let corrected = first.clone().with_price(Some(69.9));
        let later = record("Cartucho HP 664 Preto", now - Duration::hours(1));

        store.bulk_upsert(&[first, later]).await.unwrap();
        store.bulk_upsert(&[corrected]).await.unwrap();

        let records = store.query_range(&RangeQuery::last_days(1).with_title("664")).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].price, Some(69.9));
        assert_eq!(records[0].comments, ["Ótimo, chegou rápido", "Tinta boa | recomendo"]);
        assert_eq!(records[0].seller.as_deref(), Some("Loja Oficial HP"));
        assert!(records[0].is_original);
        assert!(records[0].timestamp < records[1].timestamp);
    }

    #[tokio::test]
    async fn records_without_id_are_counted_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvDocumentStore::create(dir.path().join("prices.csv")).unwrap();
        let mut unnamed = record("Cartucho HP 664 Preto", Utc::now());
        unnamed.id = None;

        let outcome = store.bulk_upsert(&[unnamed]).await.unwrap();
        assert_eq!((outcome.succeeded, outcome.failed), (0, 1));
    }
}

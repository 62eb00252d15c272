//! Product records produced by one extraction event.
//!
//! A record is a point-in-time sample of a listing. Re-extracting the same
//! listing later yields a new record with its own timestamp and identifier;
//! records are never updated in place.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Titles must be strictly longer than this many characters.
pub const MIN_TITLE_CHARS: usize = 5;

/// One search to run against the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub term: String,
    /// Catalog item this search was derived from, if any
    pub catalog_item_id: Option<i64>,
    /// Part number of the originating catalog item
    pub part_number: Option<String>,
    /// Sellers the catalog item lists as authorized
    #[serde(default)]
    pub authorized_sellers: Vec<String>,
    pub issued_at: DateTime<Utc>,
}

impl SearchQuery {
    /// Ad hoc query for a free-text term.
    pub fn ad_hoc(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            catalog_item_id: None,
            part_number: None,
            authorized_sellers: Vec::new(),
            issued_at: Utc::now(),
        }
    }
}

/// The durable unit written to the analytics store.
///
/// Field names are the store document schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Assigned by the indexer when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub price: Option<f64>,
    #[serde(default)]
    pub old_price: Option<f64>,
    #[serde(default)]
    pub discount_percent: Option<u8>,
    pub link: String,
    pub seller: Option<String>,
    #[serde(default)]
    pub is_official_store: bool,
    #[serde(default)]
    pub is_authorized_seller: Option<bool>,
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub free_shipping: bool,
    #[serde(default)]
    pub is_international: bool,
    #[serde(default)]
    pub is_full: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_original: bool,
    #[serde(default)]
    pub is_remanufactured: bool,
    #[serde(default)]
    pub cartridge_model: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    pub search_term: String,
    #[serde(default)]
    pub catalog_item_id: Option<i64>,
    #[serde(default)]
    pub catalog_pn: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ProductRecord {
    /// Minimal record with every optional field unset.
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        search_term: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            price: None,
            old_price: None,
            discount_percent: None,
            link: link.into(),
            seller: None,
            is_official_store: false,
            is_authorized_seller: None,
            rating: None,
            review_count: 0,
            comments: Vec::new(),
            free_shipping: false,
            is_international: false,
            is_full: false,
            location: None,
            is_original: false,
            is_remanufactured: false,
            cartridge_model: None,
            part_number: None,
            search_term: search_term.into(),
            catalog_item_id: None,
            catalog_pn: None,
            timestamp,
        }
    }

    /// Returns the record with its comment list replaced.
    #[must_use]
    pub fn with_comments(mut self, comments: Vec<String>) -> Self {
        self.comments = comments;
        self
    }

    #[must_use]
    pub fn with_price(mut self, price: Option<f64>) -> Self {
        self.price = price;
        self
    }

    /// Identifier this record gets when none was assigned.
    pub fn derived_id(&self) -> String {
        record_id(&self.title, &self.link, &self.search_term, self.timestamp)
    }

    pub fn has_valid_title(&self) -> bool {
        is_valid_title(&self.title)
    }
}

pub fn is_valid_title(title: &str) -> bool {
    title.trim().chars().count() > MIN_TITLE_CHARS
}

/// Deterministic identifier for one extraction event.
///
/// blake3 over title, link, search term and the full-precision extraction
/// timestamp. Re-indexing the same record overwrites it; the same listing seen
/// under another term, or extracted again later, yields a new document.
pub fn record_id(title: &str, link: &str, search_term: &str, timestamp: DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(b"\n");
    hasher.update(link.trim().as_bytes());
    hasher.update(b"\n");
    hasher.update(search_term.trim().as_bytes());
    hasher.update(b"\n");
    hasher.update(timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
    hasher.finalize().to_hex()[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn record_id_is_stable_for_the_same_event() {
        let a = record_id("Cartucho HP 664 Preto", "https://x/1", "hp 664", at(10, 0, 5));
        let b = record_id(" Cartucho HP 664 Preto ", "https://x/1", "hp 664", at(10, 0, 5));
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn record_id_separates_events_within_a_minute() {
        let first = record_id("Cartucho HP 664 Preto", "https://x/1", "hp 664", at(10, 0, 5));
        let later = record_id("Cartucho HP 664 Preto", "https://x/1", "hp 664", at(10, 0, 6));
        assert_ne!(first, later);

        let millis = at(10, 0, 5) + chrono::Duration::milliseconds(1);
        assert_ne!(first, record_id("Cartucho HP 664 Preto", "https://x/1", "hp 664", millis));
    }

    #[test]
    fn record_id_depends_on_search_term() {
        let a = record_id("Cartucho HP 664 Preto", "https://x/1", "hp 664", at(10, 0, 0));
        let b = record_id("Cartucho HP 664 Preto", "https://x/1", "cartucho hp 664", at(10, 0, 0));
        assert_ne!(a, b);
    }

    #[test]
    fn record_id_depends_on_link() {
        let a = record_id("Cartucho HP 664 Preto", "https://x/1", "hp 664", at(10, 0, 0));
        let b = record_id("Cartucho HP 664 Preto", "https://x/2", "hp 664", at(10, 0, 0));
        assert_ne!(a, b);
    }

    #[test]
    fn title_validity_counts_characters() {
        assert!(!is_valid_title("Tinta"));
        assert!(!is_valid_title("  Tinta  "));
        assert!(is_valid_title("Tintas"));
        assert!(is_valid_title("Cartucho"));
    }

    #[test]
    fn serialized_record_uses_store_field_names() {
        let mut record =
            ProductRecord::new("Cartucho HP 664", "https://x/1", "hp 664", at(9, 0, 0));
        record.id = Some(record.derived_id());
        let doc = serde_json::to_value(&record).unwrap();
        for field in [
            "id", "title", "price", "link", "seller", "rating", "review_count", "comments",
            "search_term", "timestamp", "free_shipping", "is_original", "is_remanufactured",
        ] {
            assert!(doc.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn missing_timestamp_defaults_to_now() {
        let before = Utc::now();
        let record: ProductRecord = serde_json::from_value(serde_json::json!({
            "title": "Cartucho HP 664",
            "price": null,
            "link": "https://x/1",
            "seller": null,
            "rating": null,
            "search_term": "hp 664"
        }))
        .unwrap();
        assert!(record.timestamp >= before);
        assert_eq!(record.review_count, 0);
        assert!(record.id.is_none());
    }
}

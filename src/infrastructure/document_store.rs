//! Analytics store adapters
//!
//! `ElasticsearchStore` speaks the Elasticsearch/OpenSearch REST API over
//! reqwest: `_bulk` with NDJSON `index` actions for writes (so a repeated id
//! overwrites) and `_search` for time-range reads. The index and its field
//! mappings are put in place before the first bulk write. `InMemoryDocumentStore`
//! has the same upsert semantics and backs tests and `--dry-run`.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::{Client, RequestBuilder, StatusCode, header::CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{BulkResponse, DocumentStore, IndexError, ProductRecord, RangeQuery};
use crate::domain::repositories::MAX_RANGE_QUERY_SIZE;
use crate::infrastructure::config::{ConfigError, SecretString, StoreConfig};

/// Per-document error messages kept in a [`BulkResponse`]
const MAX_REPORTED_ERRORS: usize = 5;

enum Credentials {
    None,
    Basic { username: String, password: Option<SecretString> },
    ApiKey(SecretString),
}

/// Elasticsearch-compatible document store
pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    index: String,
    credentials: Credentials,
    index_ready: OnceCell<()>,
}

impl ElasticsearchStore {
    pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
        let base_url = config.endpoint()?;
        let index = config.index_name()?.to_string();

        let credentials = match (&config.api_key, &config.username) {
            (Some(key), _) => Credentials::ApiKey(key.clone()),
            (None, Some(username)) => Credentials::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, None) => Credentials::None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::validation(format!("store HTTP client: {e}")))?;

        info!("Document store configured at {} (index {})", base_url, index);
        Ok(Self { client, base_url, index, credentials, index_ready: OnceCell::new() })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::None => request,
            Credentials::Basic { username, password } => {
                request.basic_auth(username, password.as_ref().map(|p| p.expose_secret()))
            }
            Credentials::ApiKey(key) => {
                request.header("Authorization", format!("ApiKey {}", key.expose_secret()))
            }
        }
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value, IndexError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(IndexError::Rejected { status: status.as_u16(), body });
        }
        serde_json::from_str(&body)
            .map_err(|e| IndexError::InvalidResponse { message: e.to_string() })
    }

    /// Creates the index with [`index_mappings`] when it is absent, otherwise
    /// puts the mappings on the existing index. Runs once per store.
    pub async fn ensure_index(&self) -> Result<(), IndexError> {
        self.index_ready.get_or_try_init(|| self.create_or_update_index()).await?;
        Ok(())
    }

    async fn create_or_update_index(&self) -> Result<(), IndexError> {
        let head = self.authorize(self.client.head(self.endpoint(&self.index))).send().await?;
        match head.status() {
            StatusCode::NOT_FOUND => {
                info!(index = %self.index, "Creating index");
                let request = self
                    .client
                    .put(self.endpoint(&self.index))
                    .json(&json!({ "mappings": index_mappings() }));
                self.send_json(request).await?;
            }
            status if status.is_success() => {
                debug!(index = %self.index, "Index exists, updating mappings");
                let request = self
                    .client
                    .put(self.endpoint(&format!("{}/_mapping", self.index)))
                    .json(&index_mappings());
                self.send_json(request).await?;
            }
            status => {
                return Err(IndexError::Rejected { status: status.as_u16(), body: String::new() });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn bulk_upsert(&self, records: &[ProductRecord]) -> Result<BulkResponse, IndexError> {
        if records.is_empty() {
            return Ok(BulkResponse::default());
        }

        self.ensure_index().await?;
        let body = build_bulk_body(&self.index, records)?;
        debug!("Sending bulk request with {} documents", records.len());

        let request = self
            .client
            .post(self.endpoint("_bulk"))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = self.send_json(request).await?;
        let outcome = parse_bulk_response(&response)?;

        if outcome.failed > 0 {
            warn!("Bulk request: {} indexed, {} failed", outcome.succeeded, outcome.failed);
        }
        Ok(outcome)
    }

    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<ProductRecord>, IndexError> {
        let request = self
            .client
            .post(self.endpoint(&format!("{}/_search", self.index)))
            .json(&build_range_query(query));
        let response = self.send_json(request).await?;
        parse_search_hits(&response)
    }
}

/// Field mappings of the product index.
///
/// Search terms, links and ids are keywords so `match_phrase` on
/// `search_term` is an exact match; `timestamp` is a date for range reads.
pub fn index_mappings() -> Value {
    let keyword = json!({ "type": "keyword" });
    let boolean = json!({ "type": "boolean" });
    json!({
        "properties": {
            "id": keyword,
            "title": {
                "type": "text",
                "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
            },
            "price": { "type": "float" },
            "old_price": { "type": "float" },
            "discount_percent": { "type": "integer" },
            "link": keyword,
            "seller": keyword,
            "is_official_store": boolean,
            "is_authorized_seller": boolean,
            "rating": { "type": "float" },
            "review_count": { "type": "integer" },
            "comments": { "type": "text" },
            "free_shipping": boolean,
            "is_international": boolean,
            "is_full": boolean,
            "location": keyword,
            "is_original": boolean,
            "is_remanufactured": boolean,
            "cartridge_model": keyword,
            "part_number": keyword,
            "search_term": keyword,
            "catalog_item_id": { "type": "long" },
            "catalog_pn": keyword,
            "timestamp": { "type": "date" },
        }
    })
}

/// NDJSON body of a `_bulk` request, one `index` action per record.
pub fn build_bulk_body(index: &str, records: &[ProductRecord]) -> Result<String, IndexError> {
    let mut body = String::new();
    for record in records {
        let id = record.id.as_deref().ok_or(IndexError::MissingIdentifier)?;
        let action = json!({ "index": { "_index": index, "_id": id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(record)?);
        body.push('\n');
    }
    Ok(body)
}

/// Count per-item results of a `_bulk` response.
pub fn parse_bulk_response(response: &Value) -> Result<BulkResponse, IndexError> {
    let items = response
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::InvalidResponse {
            message: "bulk response has no items".to_string(),
        })?;

    let mut outcome = BulkResponse::default();
    for item in items {
        let result = item.get("index").or_else(|| item.get("create")).unwrap_or(item);
        let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
        match result.get("error") {
            None if (200..300).contains(&status) => outcome.succeeded += 1,
            error => {
                outcome.failed += 1;
                if outcome.errors.len() < MAX_REPORTED_ERRORS {
                    let id = result.get("_id").and_then(Value::as_str).unwrap_or("?");
                    let reason = error
                        .and_then(|e| e.get("reason").and_then(Value::as_str).map(str::to_string))
                        .unwrap_or_else(|| format!("status {status}"));
                    outcome.errors.push(format!("{id}: {reason}"));
                }
            }
        }
    }
    Ok(outcome)
}

/// `_search` body: title match, optional term, timestamp range, oldest first.
pub fn build_range_query(query: &RangeQuery) -> Value {
    let mut must = Vec::new();
    if let Some(title) = &query.title {
        must.push(json!({ "match": { "title": title } }));
    }
    if let Some(term) = &query.search_term {
        must.push(json!({ "match_phrase": { "search_term": term } }));
    }

    let mut range = serde_json::Map::new();
    range.insert("gte".to_string(), json!(query.since.to_rfc3339()));
    if let Some(until) = query.until {
        range.insert("lte".to_string(), json!(until.to_rfc3339()));
    }
    must.push(json!({ "range": { "timestamp": range } }));

    json!({
        "query": { "bool": { "must": must } },
        "sort": [{ "timestamp": { "order": "asc" } }],
        "size": query.size.min(MAX_RANGE_QUERY_SIZE),
    })
}

/// Records from `hits.hits[]._source`; `_id` fills a missing `id`.
pub fn parse_search_hits(response: &Value) -> Result<Vec<ProductRecord>, IndexError> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::InvalidResponse {
            message: "search response has no hits".to_string(),
        })?;

    let mut records = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(source) = hit.get("_source") else { continue };
        match serde_json::from_value::<ProductRecord>(source.clone()) {
            Ok(mut record) => {
                if record.id.is_none() {
                    record.id = hit.get("_id").and_then(Value::as_str).map(str::to_string);
                }
                records.push(record);
            }
            Err(e) => warn!("Skipping unreadable document: {}", e),
        }
    }
    Ok(records)
}

/// Store keeping documents in memory, keyed by id
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<IndexMap<String, ProductRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<ProductRecord> {
        self.documents.read().await.get(id).cloned()
    }

    /// Every stored document in first-insert order.
    pub async fn documents(&self) -> Vec<ProductRecord> {
        self.documents.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn bulk_upsert(&self, records: &[ProductRecord]) -> Result<BulkResponse, IndexError> {
        let mut documents = self.documents.write().await;
        let mut outcome = BulkResponse::default();
        for record in records {
            match &record.id {
                Some(id) => {
                    documents.insert(id.clone(), record.clone());
                    outcome.succeeded += 1;
                }
                None => {
                    outcome.failed += 1;
                    if outcome.errors.len() < MAX_REPORTED_ERRORS {
                        outcome.errors.push(IndexError::MissingIdentifier.to_string());
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<ProductRecord>, IndexError> {
        let documents = self.documents.read().await;
        let mut records: Vec<ProductRecord> =
            documents.values().filter(|r| query.matches(r)).cloned().collect();
        records.sort_by_key(|r| r.timestamp);
        records.truncate(query.size.min(MAX_RANGE_QUERY_SIZE));
        Ok(records)
    }
}

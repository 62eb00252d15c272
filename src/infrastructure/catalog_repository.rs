//! Catalog item sources
//!
//! `SqliteCatalogSource` reads the external product catalog; `InMemoryCatalog`
//! serves fixed items for tests and dry runs.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::domain::{CatalogError, CatalogItem, CatalogSource};

#[derive(Debug, sqlx::FromRow)]
struct CatalogItemRow {
    id: i64,
    name: String,
    search_terms: Option<String>,
    part_number: Option<String>,
    is_active: bool,
    authorized_sellers: String,
}

impl TryFrom<CatalogItemRow> for CatalogItem {
    type Error = CatalogError;

    fn try_from(row: CatalogItemRow) -> Result<Self, Self::Error> {
        let authorized_sellers = if row.authorized_sellers.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&row.authorized_sellers).map_err(|e| CatalogError::MalformedRow {
                id: row.id,
                reason: format!("authorized_sellers is not a JSON string array: {e}"),
            })?
        };

        Ok(Self {
            id: row.id,
            name: row.name,
            search_terms: row.search_terms,
            part_number: row.part_number,
            is_active: row.is_active,
            authorized_sellers,
        })
    }
}

/// Catalog backed by the `catalog_items` table
#[derive(Clone)]
pub struct SqliteCatalogSource {
    pool: Arc<SqlitePool>,
}

impl SqliteCatalogSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Insert or replace one catalog item.
    pub async fn upsert_item(&self, item: &CatalogItem) -> Result<(), CatalogError> {
        let sellers = serde_json::to_string(&item.authorized_sellers).map_err(|e| {
            CatalogError::MalformedRow {
                id: item.id,
                reason: e.to_string(),
            }
        })?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO catalog_items
            (id, name, search_terms, part_number, is_active, authorized_sellers)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(&item.search_terms)
        .bind(&item.part_number)
        .bind(item.is_active)
        .bind(sellers)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for SqliteCatalogSource {
    async fn active_items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        let rows: Vec<CatalogItemRow> = sqlx::query_as(
            r"
            SELECT id, name, search_terms, part_number, is_active, authorized_sellers
            FROM catalog_items
            WHERE is_active = 1
            ORDER BY id
            ",
        )
        .fetch_all(&*self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match CatalogItem::try_from(row) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping catalog row: {}", e),
            }
        }
        debug!("Loaded {} active catalog items", items.len());
        Ok(items)
    }
}

/// Fixed in-memory catalog
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    items: Vec<CatalogItem>,
}

impl InMemoryCatalog {
    pub const fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn active_items(&self) -> Result<Vec<CatalogItem>, CatalogError> {
        Ok(self.items.iter().filter(|item| item.is_active).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use tempfile::tempdir;

    fn item(id: i64, name: &str, active: bool) -> CatalogItem {
        CatalogItem {
            id,
            name: name.to_string(),
            search_terms: None,
            part_number: Some("3YM84AB".to_string()),
            is_active: active,
            authorized_sellers: vec!["HP Store".to_string()],
        }
    }

    #[tokio::test]
    async fn sqlite_source_returns_active_items_in_id_order() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();

        let source = SqliteCatalogSource::new(db.pool().clone());
        source.upsert_item(&item(2, "Cartucho HP 667 Colorido", true)).await.unwrap();
        source.upsert_item(&item(1, "Cartucho HP 664 Preto", true)).await.unwrap();
        source.upsert_item(&item(3, "Cartucho HP 662 Preto", false)).await.unwrap();

        let items = source.active_items().await.unwrap();
        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(items[0].authorized_sellers, ["HP Store"]);
    }

    #[tokio::test]
    async fn malformed_seller_list_skips_row() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();

        sqlx::query(
            "INSERT INTO catalog_items (id, name, authorized_sellers) \
             VALUES (1, 'HP 664', 'not json')",
        )
        .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO catalog_items (id, name) VALUES (2, 'HP 667')")
            .execute(db.pool())
            .await
            .unwrap();

        let items = SqliteCatalogSource::new(db.pool().clone()).active_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 2);
        assert!(items[0].authorized_sellers.is_empty());
    }

    #[tokio::test]
    async fn in_memory_catalog_filters_inactive() {
        let catalog = InMemoryCatalog::new(vec![item(1, "HP 664", false), item(2, "HP 667", true)]);
        let items = catalog.active_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 2);
    }
}

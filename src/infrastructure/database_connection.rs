// Database connection and pool management
// This module handles the SQLite catalog database using sqlx

use std::path::Path;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::debug;

use crate::domain::CatalogError;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self, CatalogError> {
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if db_path != ":memory:" {
            let parent = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(parent) = parent {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CatalogError::Database(sqlx::Error::Io(e)))?;
            }
            // sqlx will not create a missing file without `mode=rwc`
            if !Path::new(db_path).exists() {
                tokio::fs::File::create(db_path)
                    .await
                    .map_err(|e| CatalogError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        debug!("Connected to catalog database {}", database_url);
        Ok(Self { pool })
    }

    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), CatalogError> {
        let create_catalog_items_sql = r"
            CREATE TABLE IF NOT EXISTS catalog_items (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                search_terms TEXT,
                part_number TEXT,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                authorized_sellers TEXT NOT NULL DEFAULT '[]'
            )
        ";

        let create_indexes_sql = r"
            CREATE INDEX IF NOT EXISTS idx_catalog_items_active ON catalog_items (is_active);
        ";

        sqlx::query(create_catalog_items_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}

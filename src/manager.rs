// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lazy index lifecycle managers.
//!
//! A manager owns one connection pool and hands out typed index handles on
//! demand. The first request for a given document type and collection
//! bootstraps the schema exactly once, even under concurrent first access:
//! the cache is checked, the init lock is taken, the cache is checked again,
//! and only then does schema creation run.
//!
//! Table names are derived deterministically from the document type and the
//! collection, so two processes pointed at the same database agree on the
//! physical table without coordination.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;

use crate::document::Document;
use crate::error::IndexError;
use crate::index::{PgIndex, SqliteIndex};

/// PostgreSQL truncates identifiers at 63 bytes.
const PG_MAX_IDENTIFIER: usize = 63;
/// SQLite has no meaningful limit; capped near the PostgreSQL one so names
/// stay portable across backends.
const SQLITE_MAX_IDENTIFIER: usize = 64;

const MAX_CONNECTIONS: u32 = 10;

/// Lowercase and keep `[a-z0-9_]`; everything else becomes `_`.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|ch| match ch.to_ascii_lowercase() {
            ch @ ('a'..='z' | '0'..='9' | '_') => ch,
            _ => '_',
        })
        .collect()
}

/// The unqualified tail of a Rust type path.
fn type_tail(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

/// Derive the physical table name for a document type in a collection.
///
/// Shape is `search_{type}_{collection}`. When the result exceeds the
/// backend identifier limit, only the type portion is trimmed; the
/// collection is the caller's namespace and must survive intact.
fn derive_table_name(
    type_name: &str,
    collection: &str,
    max_len: usize,
) -> Result<String, IndexError> {
    let ty = sanitize(type_tail(type_name));
    let coll = sanitize(collection);
    if coll.is_empty() {
        return Err(IndexError::Usage(
            "collection name must not be empty".to_string(),
        ));
    }
    // "search_" + type + "_" + collection
    let fixed = 7 + 1 + coll.len();
    if fixed + 1 > max_len {
        return Err(IndexError::Usage(format!(
            "collection name '{collection}' leaves no room for a table name \
             within {max_len} characters"
        )));
    }
    let budget = max_len - fixed;
    let ty = &ty[..ty.len().min(budget)];
    Ok(format!("search_{ty}_{coll}"))
}

/// Manager over an embedded SQLite database file.
pub struct SqliteIndexManager {
    pool: SqlitePool,
    indexes: DashMap<String, Arc<dyn Any + Send + Sync>>,
    init_lock: Mutex<()>,
}

impl SqliteIndexManager {
    /// Open a pool for `url` (e.g. `sqlite://search.db?mode=rwc`) with WAL
    /// journaling and relaxed fsync, the standard embedded configuration.
    pub async fn connect(url: &str) -> Result<Self, IndexError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;
        tracing::info!(url = %url, "sqlite index manager connected");
        Ok(Self::new(pool))
    }

    /// Wrap an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            indexes: DashMap::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Get or lazily create the index for `D` in `collection`.
    pub async fn index<D: Document>(
        &self,
        collection: &str,
    ) -> Result<Arc<SqliteIndex<D>>, IndexError> {
        let table = derive_table_name(
            std::any::type_name::<D>(),
            collection,
            SQLITE_MAX_IDENTIFIER,
        )?;
        if let Some(entry) = self.indexes.get(&table) {
            if let Ok(index) = Arc::clone(entry.value()).downcast::<SqliteIndex<D>>() {
                return Ok(index);
            }
        }

        let _guard = self.init_lock.lock().await;
        if let Some(entry) = self.indexes.get(&table) {
            if let Ok(index) = Arc::clone(entry.value()).downcast::<SqliteIndex<D>>() {
                return Ok(index);
            }
        }
        let index = Arc::new(SqliteIndex::<D>::new(self.pool.clone(), table.clone()));
        index.init_schema().await?;
        self.indexes
            .insert(table, Arc::clone(&index) as Arc<dyn Any + Send + Sync>);
        Ok(index)
    }

    /// Drop the index for `D` in `collection`, removing its tables. A later
    /// `index()` call recreates it empty. Unknown indexes are a no-op.
    pub async fn drop_index<D: Document>(&self, collection: &str) -> Result<(), IndexError> {
        let table = derive_table_name(
            std::any::type_name::<D>(),
            collection,
            SQLITE_MAX_IDENTIFIER,
        )?;
        let _guard = self.init_lock.lock().await;
        self.indexes.remove(&table);
        let index = SqliteIndex::<D>::new(self.pool.clone(), table);
        index.drop_schema().await
    }
}

/// Manager over a PostgreSQL server.
pub struct PgIndexManager {
    pool: PgPool,
    indexes: DashMap<String, Arc<dyn Any + Send + Sync>>,
    init_lock: Mutex<()>,
}

impl PgIndexManager {
    pub async fn connect(url: &str) -> Result<Self, IndexError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;
        tracing::info!("postgres index manager connected");
        Ok(Self::new(pool))
    }

    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            indexes: DashMap::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Get or lazily create the index for `D` in `collection`.
    pub async fn index<D: Document>(
        &self,
        collection: &str,
    ) -> Result<Arc<PgIndex<D>>, IndexError> {
        let table =
            derive_table_name(std::any::type_name::<D>(), collection, PG_MAX_IDENTIFIER)?;
        if let Some(entry) = self.indexes.get(&table) {
            if let Ok(index) = Arc::clone(entry.value()).downcast::<PgIndex<D>>() {
                return Ok(index);
            }
        }

        let _guard = self.init_lock.lock().await;
        if let Some(entry) = self.indexes.get(&table) {
            if let Ok(index) = Arc::clone(entry.value()).downcast::<PgIndex<D>>() {
                return Ok(index);
            }
        }
        let index = Arc::new(PgIndex::<D>::new(self.pool.clone(), table.clone()));
        index.init_schema().await?;
        self.indexes
            .insert(table, Arc::clone(&index) as Arc<dyn Any + Send + Sync>);
        Ok(index)
    }

    /// Drop the index for `D` in `collection`, removing its table. A later
    /// `index()` call recreates it empty. Unknown indexes are a no-op.
    pub async fn drop_index<D: Document>(&self, collection: &str) -> Result<(), IndexError> {
        let table =
            derive_table_name(std::any::type_name::<D>(), collection, PG_MAX_IDENTIFIER)?;
        let _guard = self.init_lock.lock().await;
        self.indexes.remove(&table);
        let index = PgIndex::<D>::new(self.pool.clone(), table);
        index.drop_schema().await
    }
}

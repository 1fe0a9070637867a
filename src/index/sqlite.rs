// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Embedded SQLite index backed by an FTS5 shadow table.
//!
//! One base table holds the documents; a paired `{table}_fts` virtual table
//! holds the searchable text and is kept in lockstep by AFTER triggers, so
//! every write path (including trigger-driven cascade deletes) maintains the
//! search index without application cooperation.
//!
//! SQLite allows one writer at a time per database file. All write methods
//! funnel through a process-wide async mutex so concurrent callers queue
//! instead of surfacing SQLITE_BUSY. Reads never take the lock.

use std::marker::PhantomData;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::query::Query;
use sqlx::Row;
use tokio::sync::Mutex;

use super::{DocumentIndex, DELETE_CHUNK};
use crate::document::Document;
use crate::error::IndexError;
use crate::filter::{ParamList, ParamValue};
use crate::query::{SearchRequest, SearchResponse, SearchResult, SqliteQueryAssembler};

static WRITE_LOCK: Mutex<()> = Mutex::const_new(());

/// RFC 3339 shape for stored metadata columns such as `last_updated`.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Timestamp comparison operands are bound as fixed millisecond text, the
/// same shape `strftime('%Y-%m-%dT%H:%M:%f', ...)` produces for the stored
/// side. Mixed fractional precision would break lexical ordering.
fn format_timestamp_operand(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &ParamList,
) -> Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for param in params.params() {
        query = match &param.value {
            ParamValue::Text(v) => query.bind(v.clone()),
            ParamValue::Integer(v) => query.bind(*v),
            ParamValue::Float(v) => query.bind(*v),
            ParamValue::Boolean(v) => query.bind(*v),
            ParamValue::Timestamp(v) => query.bind(format_timestamp_operand(*v)),
        };
    }
    query
}

/// A typed index over one SQLite table pair.
pub struct SqliteIndex<D: Document> {
    pool: SqlitePool,
    table: String,
    assembler: SqliteQueryAssembler,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> SqliteIndex<D> {
    pub(crate) fn new(pool: SqlitePool, table: String) -> Self {
        let assembler = SqliteQueryAssembler::new(table.clone());
        Self {
            pool,
            table,
            assembler,
            _marker: PhantomData,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the base table, the FTS5 shadow table, and the mirroring
    /// triggers. Idempotent.
    pub(crate) async fn init_schema(&self) -> Result<(), IndexError> {
        let t = &self.table;
        let fts = self.assembler.fts_table();
        let _guard = WRITE_LOCK.lock().await;
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {t} (\
                 id TEXT PRIMARY KEY, \
                 document TEXT NOT NULL, \
                 search_text TEXT NOT NULL, \
                 last_updated TEXT NOT NULL)"
            ),
            format!("CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(id UNINDEXED, search_text)"),
            format!(
                "CREATE TRIGGER IF NOT EXISTS {t}_fts_insert AFTER INSERT ON {t} BEGIN \
                 INSERT INTO {fts} (id, search_text) VALUES (new.id, new.search_text); \
                 END"
            ),
            format!(
                "CREATE TRIGGER IF NOT EXISTS {t}_fts_update AFTER UPDATE ON {t} BEGIN \
                 DELETE FROM {fts} WHERE id = old.id; \
                 INSERT INTO {fts} (id, search_text) VALUES (new.id, new.search_text); \
                 END"
            ),
            format!(
                "CREATE TRIGGER IF NOT EXISTS {t}_fts_delete AFTER DELETE ON {t} BEGIN \
                 DELETE FROM {fts} WHERE id = old.id; \
                 END"
            ),
        ];
        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!(table = %t, "sqlite index schema ready");
        Ok(())
    }

    /// Drop both tables. Triggers go with the base table.
    pub(crate) async fn drop_schema(&self) -> Result<(), IndexError> {
        let _guard = WRITE_LOCK.lock().await;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.assembler.fts_table()))
            .execute(&self.pool)
            .await?;
        tracing::debug!(table = %self.table, "sqlite index schema dropped");
        Ok(())
    }

    async fn run_count(&self, request: &SearchRequest) -> Result<u64, IndexError> {
        let assembled = self.assembler.count(request)?;
        let row = bind_params(sqlx::query(&assembled.sql), &assembled.params)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total as u64)
    }
}

#[async_trait]
impl<D: Document> DocumentIndex<D> for SqliteIndex<D> {
    async fn put(&self, document: &D) -> Result<(), IndexError> {
        let payload = serde_json::to_string(document)?;
        let sql = format!(
            "INSERT INTO {t} (id, document, search_text, last_updated) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(id) DO UPDATE SET \
             document = excluded.document, \
             search_text = excluded.search_text, \
             last_updated = excluded.last_updated",
            t = self.table
        );
        let _guard = WRITE_LOCK.lock().await;
        sqlx::query(&sql)
            .bind(document.id())
            .bind(payload)
            .bind(document.search_text())
            .bind(format_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_many(&self, documents: &[D]) -> Result<u64, IndexError> {
        if documents.is_empty() {
            return Ok(0);
        }
        // Serialize everything before the transaction opens so a bad
        // document cannot leave a half-written batch behind.
        let mut rows = Vec::with_capacity(documents.len());
        for document in documents {
            rows.push((
                document.id(),
                serde_json::to_string(document)?,
                document.search_text(),
            ));
        }
        let sql = format!(
            "INSERT INTO {t} (id, document, search_text, last_updated) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(id) DO UPDATE SET \
             document = excluded.document, \
             search_text = excluded.search_text, \
             last_updated = excluded.last_updated",
            t = self.table
        );
        let now = format_timestamp(Utc::now());

        let _guard = WRITE_LOCK.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;
        for (id, payload, search_text) in rows {
            let result = sqlx::query(&sql)
                .bind(id)
                .bind(payload)
                .bind(search_text)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        tracing::debug!(table = %self.table, written, "batch write committed");
        Ok(written)
    }

    async fn get(&self, id: &str) -> Result<Option<D>, IndexError> {
        let sql = format!("SELECT document FROM {} WHERE id = ?1", self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let payload: String = row.try_get("document")?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, IndexError> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1 LIMIT 1", self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn delete(&self, id: &str) -> Result<bool, IndexError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.table);
        let _guard = WRITE_LOCK.lock().await;
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, IndexError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _guard = WRITE_LOCK.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let placeholders = (1..=chunk.len())
                .map(|n| format!("?{n}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!("DELETE FROM {} WHERE id IN ({placeholders})", self.table);
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }
            removed += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn delete_where(
        &self,
        filters: &[crate::filter::FilterNode],
    ) -> Result<u64, IndexError> {
        let assembled = self.assembler.delete_where(filters)?;
        let _guard = WRITE_LOCK.lock().await;
        let result = bind_params(sqlx::query(&assembled.sql), &assembled.params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear(&self) -> Result<u64, IndexError> {
        let sql = format!("DELETE FROM {}", self.table);
        let _guard = WRITE_LOCK.lock().await;
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        tracing::debug!(table = %self.table, removed = result.rows_affected(), "index cleared");
        Ok(result.rows_affected())
    }

    async fn count(&self, request: &SearchRequest) -> Result<u64, IndexError> {
        self.run_count(request).await
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse<D>, IndexError> {
        let started = Instant::now();
        let assembled = self.assembler.search(request)?;
        tracing::debug!(table = %self.table, sql = %assembled.to_debug_sql(), "search");
        let rows = bind_params(sqlx::query(&assembled.sql), &assembled.params)
            .fetch_all(&self.pool)
            .await?;

        let mut total_count = 0u64;
        let mut max_score = 0.0f64;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let score: f64 = row.try_get("score")?;
            let last_updated: DateTime<Utc> = row.try_get("last_updated")?;
            let window: i64 = row.try_get("total_count")?;
            total_count = window as u64;
            if score > max_score {
                max_score = score;
            }
            let document = if request.options.include_raw_document {
                let payload: String = row.try_get("document")?;
                Some(serde_json::from_str(&payload)?)
            } else {
                None
            };
            results.push(SearchResult {
                id,
                score,
                last_updated,
                document,
            });
        }
        // The window count rides on result rows; an empty page (take = 0 or
        // skip past the end) still owes the caller the true total.
        if results.is_empty() {
            total_count = self.run_count(request).await?;
        }

        Ok(SearchResponse {
            results,
            total_count,
            max_score,
            search_time: started.elapsed(),
        })
    }
}

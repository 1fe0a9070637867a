// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Served PostgreSQL index backed by a tsvector column.
//!
//! The `search_vector` column is recomputed on every write with
//! `to_tsvector('english', ...)` and covered by a GIN index, so searches
//! never re-parse document text. Write concurrency is the server's problem;
//! there is no client-side lock here.
//!
//! Bulk ingestion COPYs rows into a `TEMP TABLE .. ON COMMIT DROP` staging
//! table and upserts from it in one statement. The whole batch lives inside
//! one transaction; any failure rolls all of it back.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::query::Query;
use sqlx::Row;

use super::{DocumentIndex, DELETE_CHUNK};
use crate::document::Document;
use crate::error::IndexError;
use crate::filter::{ParamList, ParamValue};
use crate::query::{PgQueryAssembler, SearchRequest, SearchResponse, SearchResult};

const TS_CONFIG: &str = "english";

fn bind_params<'q>(
    mut query: Query<'q, Postgres, sqlx::postgres::PgArguments>,
    params: &ParamList,
) -> Query<'q, Postgres, sqlx::postgres::PgArguments> {
    for param in params.params() {
        query = match &param.value {
            ParamValue::Text(v) => query.bind(v.clone()),
            ParamValue::Integer(v) => query.bind(*v),
            ParamValue::Float(v) => query.bind(*v),
            ParamValue::Boolean(v) => query.bind(*v),
            ParamValue::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

/// Escape one field for the COPY text format (tab-delimited rows).
fn copy_escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

/// A typed index over one PostgreSQL table.
pub struct PgIndex<D: Document> {
    pool: PgPool,
    table: String,
    assembler: PgQueryAssembler,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> PgIndex<D> {
    pub(crate) fn new(pool: PgPool, table: String) -> Self {
        let assembler = PgQueryAssembler::new(table.clone());
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

    /// Create the table and both GIN indexes. Idempotent.
    pub(crate) async fn init_schema(&self) -> Result<(), IndexError> {
        let t = &self.table;
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {t} (\
                 id TEXT PRIMARY KEY, \
                 document JSONB NOT NULL, \
                 search_vector TSVECTOR NOT NULL, \
                 last_updated TIMESTAMPTZ NOT NULL)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {t}_document_gin \
                 ON {t} USING GIN (document jsonb_path_ops)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {t}_search_gin \
                 ON {t} USING GIN (search_vector)"
            ),
        ];
        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!(table = %t, "postgres index schema ready");
        Ok(())
    }

    pub(crate) async fn drop_schema(&self) -> Result<(), IndexError> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
            .execute(&self.pool)
            .await?;
        tracing::debug!(table = %self.table, "postgres index schema dropped");
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

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {t} (id, document, search_vector, last_updated) \
             VALUES ($1, $2, to_tsvector('{TS_CONFIG}', $3), $4) \
             ON CONFLICT (id) DO UPDATE SET \
             document = EXCLUDED.document, \
             search_vector = EXCLUDED.search_vector, \
             last_updated = EXCLUDED.last_updated",
            t = self.table
        )
    }
}

#[async_trait]
impl<D: Document> DocumentIndex<D> for PgIndex<D> {
    async fn put(&self, document: &D) -> Result<(), IndexError> {
        let payload = serde_json::to_value(document)?;
        let sql = self.upsert_sql();
        sqlx::query(&sql)
            .bind(document.id())
            .bind(payload)
            .bind(document.search_text())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_many(&self, documents: &[D]) -> Result<u64, IndexError> {
        if documents.is_empty() {
            return Ok(0);
        }
        // Serialize and dedup before the transaction opens. Duplicate ids
        // inside one COPY batch would make the staged upsert touch the same
        // row twice, which ON CONFLICT rejects; last write wins instead.
        let mut by_id: HashMap<String, usize> = HashMap::with_capacity(documents.len());
        let mut rows: Vec<(String, String, String)> = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document.id();
            let payload = serde_json::to_string(document)?;
            let search_text = document.search_text();
            match by_id.get(&id) {
                Some(&slot) => rows[slot] = (id, payload, search_text),
                None => {
                    by_id.insert(id.clone(), rows.len());
                    rows.push((id, payload, search_text));
                }
            }
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let staging = format!("{}_stage", self.table);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "CREATE TEMP TABLE {staging} (\
             id TEXT, document TEXT, search_text TEXT, last_updated TIMESTAMPTZ) \
             ON COMMIT DROP"
        ))
        .execute(&mut *tx)
        .await?;

        let mut copy = tx
            .copy_in_raw(&format!(
                "COPY {staging} (id, document, search_text, last_updated) FROM STDIN"
            ))
            .await?;
        let mut buffer = String::new();
        for (id, payload, search_text) in &rows {
            buffer.clear();
            buffer.push_str(&copy_escape(id));
            buffer.push('\t');
            buffer.push_str(&copy_escape(payload));
            buffer.push('\t');
            buffer.push_str(&copy_escape(search_text));
            buffer.push('\t');
            buffer.push_str(&now);
            buffer.push('\n');
            copy.send(buffer.as_bytes()).await?;
        }
        copy.finish().await?;

        let result = sqlx::query(&format!(
            "INSERT INTO {t} (id, document, search_vector, last_updated) \
             SELECT id, document::jsonb, to_tsvector('{TS_CONFIG}', search_text), last_updated \
             FROM {staging} \
             ON CONFLICT (id) DO UPDATE SET \
             document = EXCLUDED.document, \
             search_vector = EXCLUDED.search_vector, \
             last_updated = EXCLUDED.last_updated",
            t = self.table
        ))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let written = result.rows_affected();
        tracing::debug!(table = %self.table, written, "batch write committed");
        Ok(written)
    }

    async fn get(&self, id: &str) -> Result<Option<D>, IndexError> {
        let sql = format!("SELECT document FROM {} WHERE id = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("document")?;
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn exists(&self, id: &str) -> Result<bool, IndexError> {
        let sql = format!("SELECT 1 FROM {} WHERE id = $1 LIMIT 1", self.table);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn delete(&self, id: &str) -> Result<bool, IndexError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64, IndexError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let sql = format!("DELETE FROM {} WHERE id = ANY($1)", self.table);
            removed += sqlx::query(&sql)
                .bind(chunk)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn delete_where(
        &self,
        filters: &[crate::filter::FilterNode],
    ) -> Result<u64, IndexError> {
        let assembled = self.assembler.delete_where(filters)?;
        let result = bind_params(sqlx::query(&assembled.sql), &assembled.params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn clear(&self) -> Result<u64, IndexError> {
        let sql = format!("DELETE FROM {}", self.table);
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
                let payload: serde_json::Value = row.try_get("document")?;
                Some(serde_json::from_value(payload)?)
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

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backend index implementations.
//!
//! Both backends expose the same [`DocumentIndex`] surface over one table
//! per document type and collection. The SQLite backend is embedded and
//! serializes writers process-wide; the PostgreSQL backend is a served
//! store and leans on the server for concurrency.

mod postgres;
mod sqlite;

pub use postgres::PgIndex;
pub use sqlite::SqliteIndex;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::IndexError;
use crate::filter::FilterNode;
use crate::query::{SearchRequest, SearchResponse};

/// Id lists are deleted in bounded chunks to keep statements within
/// placeholder limits on both backends.
pub(crate) const DELETE_CHUNK: usize = 500;

/// The typed index surface shared by both backends.
#[async_trait]
pub trait DocumentIndex<D: Document>: Send + Sync {
    /// Insert or fully replace one document by its id.
    async fn put(&self, document: &D) -> Result<(), IndexError>;

    /// Insert or replace a batch atomically. Returns the number of rows
    /// written; duplicate ids within the batch resolve last-wins.
    async fn put_many(&self, documents: &[D]) -> Result<u64, IndexError>;

    /// Fetch one document by id.
    async fn get(&self, id: &str) -> Result<Option<D>, IndexError>;

    /// Existence check without deserializing the payload.
    async fn exists(&self, id: &str) -> Result<bool, IndexError>;

    /// Remove one document. Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool, IndexError>;

    /// Remove a batch of ids. Returns the number of rows removed.
    async fn delete_many(&self, ids: &[String]) -> Result<u64, IndexError>;

    /// Remove every document matching all of the given filters.
    ///
    /// Refuses an empty filter list; [`DocumentIndex::clear`] is the
    /// explicit way to empty an index.
    async fn delete_where(&self, filters: &[FilterNode]) -> Result<u64, IndexError>;

    /// Remove every document. Returns the number of rows removed.
    async fn clear(&self) -> Result<u64, IndexError>;

    /// How many documents match the request, ignoring pagination.
    async fn count(&self, request: &SearchRequest) -> Result<u64, IndexError>;

    /// Run a full search request.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse<D>, IndexError>;
}

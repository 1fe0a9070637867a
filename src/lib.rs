//! # fts-bridge
//!
//! Typed document indexing and filtered full-text search over two SQL
//! backends: embedded SQLite (FTS5) and served PostgreSQL (tsvector).
//!
//! ## Architecture
//!
//! One search request flows through the same pipeline on either backend;
//! only the bottom layer differs:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SearchRequest                          │
//! │  • Free-text query + FilterNode trees + ordering/paging    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Filter compilation                       │
//! │  • One dialect-specific SQL fragment per filter tree       │
//! │  • Values always travel as bound parameters               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Query assembly                          │
//! │  • Relevance scoring, min-score, ordering, pagination      │
//! │  • Window total count in the same round trip              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//! ┌─────────────────────────┐  ┌──────────────────────────────┐
//! │   SqliteIndex (FTS5)    │  │   PgIndex (tsvector + GIN)   │
//! │  • Trigger-mirrored     │  │  • to_tsvector on write      │
//! │    shadow table         │  │  • COPY bulk ingestion       │
//! │  • Process write mutex  │  │  • Server-side concurrency   │
//! └─────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fts_bridge::{field, Document, DocumentIndex, SearchRequest, SqliteIndexManager};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Book {
//!     isbn: String,
//!     title: String,
//!     summary: String,
//!     pages: i64,
//! }
//!
//! impl Document for Book {
//!     fn id(&self) -> String {
//!         self.isbn.clone()
//!     }
//!     fn search_text(&self) -> String {
//!         format!("{} {}", self.title, self.summary)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fts_bridge::IndexError> {
//!     let manager = SqliteIndexManager::connect("sqlite://search.db?mode=rwc").await?;
//!     let index = manager.index::<Book>("library").await?;
//!
//!     index
//!         .put(&Book {
//!             isbn: "978-1".into(),
//!             title: "The Rust Programming Language".into(),
//!             summary: "Systems programming with guarantees".into(),
//!             pages: 560,
//!         })
//!         .await?;
//!
//!     let response = index
//!         .search(
//!             &SearchRequest::new()
//!                 .with_query("rust programming")
//!                 .filter(field("pages").gt(100)),
//!         )
//!         .await?;
//!     println!("{} matches", response.total_count);
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod manager;
pub mod query;

pub use document::Document;
pub use error::IndexError;
pub use filter::{
    field, FilterNode, FilterValue, LogicalOperator, Operator, PropertyType,
};
pub use index::{DocumentIndex, PgIndex, SqliteIndex};
pub use manager::{PgIndexManager, SqliteIndexManager};
pub use query::{
    OrderBy, SearchOptions, SearchRequest, SearchResponse, SearchResult, SortDirection,
};

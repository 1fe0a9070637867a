// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request/response types and the per-dialect query assemblers.
//!
//! A [`SearchRequest`] combines a free-text relevance query, accumulated
//! filters (ANDed together), ordering keys and pagination options. The
//! assemblers turn one request into one executable statement per operation
//! (search, count, delete-where); the two backends share no assembly code
//! because the relevance mechanism differs structurally.
//!
//! ```text
//! SearchRequest
//!     ↓
//!     ├─→ SqliteQueryAssembler → FTS5 subquery join + json_extract filters
//!     └─→ PgQueryAssembler     → tsvector @@ websearch_to_tsquery + ->> filters
//! ```

mod postgres;
mod sqlite;

pub use postgres::PgQueryAssembler;
pub use sqlite::SqliteQueryAssembler;

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::filter::{FilterNode, ParamList, ParamStyle, ParamValue};

/// Sort direction for one ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One ordering key; multiple keys form a tie-break chain, earliest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub property: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Pagination and scoring options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Rows to skip before the window. Skipping past the end of the result
    /// set yields zero rows, never an error.
    pub skip: u64,
    /// Window size. Zero yields zero rows (the total count is still
    /// reported).
    pub take: u64,
    /// Rows scoring below this are excluded, not merely down-ranked.
    /// Requires a relevance query; a positive threshold without one is
    /// rejected as a [`IndexError::Usage`](crate::IndexError::Usage) error.
    pub min_score: f64,
    /// Populate [`SearchResult::document`]; disable for id-only queries.
    pub include_raw_document: bool,
    /// Match any individual query term instead of requiring the exact phrase.
    pub include_partial_matches: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            skip: 0,
            take: 100,
            min_score: 0.0,
            include_raw_document: true,
            include_partial_matches: true,
        }
    }
}

/// One search/count/delete-where request.
///
/// Filters added through [`SearchRequest::filter`] are combined with AND;
/// OR semantics belong inside a single [`FilterNode::or`] group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub filters: Vec<FilterNode>,
    pub order_by: Vec<OrderBy>,
    pub options: SearchOptions,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn filter(mut self, filter: FilterNode) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = skip;
        self
    }

    pub fn take(mut self, take: u64) -> Self {
        self.options.take = take;
        self
    }

    pub fn min_score(mut self, min_score: f64) -> Self {
        self.options.min_score = min_score;
        self
    }

    pub fn include_raw_document(mut self, include: bool) -> Self {
        self.options.include_raw_document = include;
        self
    }

    pub fn include_partial_matches(mut self, include: bool) -> Self {
        self.options.include_partial_matches = include;
        self
    }

    /// The relevance query, if one was supplied and is non-blank.
    pub(crate) fn trimmed_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

/// A positive score threshold without query text has no score to apply to.
/// Rejecting it keeps the two outcomes distinct: an empty result set means
/// nothing matched, not that the threshold was silently dropped.
pub(crate) fn check_min_score(request: &SearchRequest) -> Result<(), IndexError> {
    if request.options.min_score > 0.0 && request.trimmed_query().is_none() {
        return Err(IndexError::Usage(
            "min_score requires a relevance query; set query text or drop the threshold"
                .to_string(),
        ));
    }
    Ok(())
}

/// One matched document.
#[derive(Debug, Clone)]
pub struct SearchResult<D> {
    pub id: String,
    pub score: f64,
    pub last_updated: DateTime<Utc>,
    /// Populated only when the request asked for raw documents.
    pub document: Option<D>,
}

/// A page of results plus window metadata.
#[derive(Debug, Clone)]
pub struct SearchResponse<D> {
    pub results: Vec<SearchResult<D>>,
    /// Size of the full filtered/matched set before pagination.
    pub total_count: u64,
    pub max_score: f64,
    pub search_time: Duration,
}

/// An executable statement: SQL text plus its ordered bound parameters.
#[derive(Debug, Clone)]
pub struct AssembledQuery {
    pub sql: String,
    pub params: ParamList,
}

impl AssembledQuery {
    /// SQL with parameter values substituted inline.
    ///
    /// For logs and debugging only; never execute this string.
    pub fn to_debug_sql(&self) -> String {
        let mut sql = self.sql.clone();
        let style = self.params.style();
        for (i, param) in self.params.params().iter().enumerate().rev() {
            let placeholder = match style {
                ParamStyle::Sqlite => format!("?{}", i + 1),
                ParamStyle::Postgres => format!("${}", i + 1),
            };
            let literal = match &param.value {
                ParamValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
                ParamValue::Integer(v) => v.to_string(),
                ParamValue::Float(v) => v.to_string(),
                ParamValue::Boolean(v) => match style {
                    ParamStyle::Sqlite => if *v { "1" } else { "0" }.to_string(),
                    ParamStyle::Postgres => if *v { "TRUE" } else { "FALSE" }.to_string(),
                },
                ParamValue::Timestamp(v) => {
                    format!("'{}'", v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                }
            };
            sql = sql.replace(&placeholder, &literal);
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::field;

    #[test]
    fn test_default_options() {
        let options = SearchOptions::default();
        assert_eq!(options.skip, 0);
        assert_eq!(options.take, 100);
        assert_eq!(options.min_score, 0.0);
        assert!(options.include_raw_document);
        assert!(options.include_partial_matches);
    }

    #[test]
    fn test_request_builder_accumulates_filters() {
        let request = SearchRequest::new()
            .with_query("rust async")
            .filter(field("status").eq("published"))
            .filter(field("pages").gt(50))
            .order_by(OrderBy::desc("pages"))
            .skip(10)
            .take(5);

        assert_eq!(request.filters.len(), 2);
        assert_eq!(request.order_by.len(), 1);
        assert_eq!(request.options.skip, 10);
        assert_eq!(request.options.take, 5);
    }

    #[test]
    fn test_blank_query_is_no_query() {
        assert_eq!(SearchRequest::new().trimmed_query(), None);
        assert_eq!(SearchRequest::new().with_query("   ").trimmed_query(), None);
        assert_eq!(
            SearchRequest::new().with_query(" cats ").trimmed_query(),
            Some("cats")
        );
    }

    #[test]
    fn test_debug_sql_substitution() {
        let mut params = ParamList::sqlite();
        let p1 = params.push(ParamValue::Text("O'Brien".to_string()));
        let p2 = params.push(ParamValue::Integer(3));
        let assembled = AssembledQuery {
            sql: format!("SELECT * FROM t WHERE a = {p1} AND b = {p2}"),
            params,
        };
        assert_eq!(
            assembled.to_debug_sql(),
            "SELECT * FROM t WHERE a = 'O''Brien' AND b = 3"
        );
    }

    #[test]
    fn test_debug_sql_two_digit_placeholders() {
        let mut params = ParamList::postgres();
        let mut placeholders = Vec::new();
        for i in 0..12 {
            placeholders.push(params.push(ParamValue::Integer(i)));
        }
        let assembled = AssembledQuery {
            sql: format!("VALUES ({})", placeholders.join(", ")),
            params,
        };
        assert_eq!(
            assembled.to_debug_sql(),
            "VALUES (0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11)"
        );
    }
}

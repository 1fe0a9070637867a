// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! PostgreSQL query assembler.
//!
//! Relevance comes from the precomputed `search_vector` column and
//! `websearch_to_tsquery`. The parsed query is pushed once and the same
//! placeholder is reused everywhere the tsquery appears (match predicate,
//! rank expression, score threshold), so the server parses the query text
//! a single time per statement:
//!
//! ```sql
//! SELECT id, document, last_updated,
//!        ts_rank(search_vector, websearch_to_tsquery('english', $1)) AS score,
//!        COUNT(*) OVER () AS total_count
//! FROM docs
//! WHERE search_vector @@ websearch_to_tsquery('english', $1)
//! ORDER BY ... LIMIT $n OFFSET $m
//! ```

use super::{AssembledQuery, OrderBy, SearchRequest, SortDirection};
use crate::error::IndexError;
use crate::filter::{
    check_property, FilterCompiler, FilterNode, ParamList, ParamValue, PgFilterCompiler,
};

const TS_CONFIG: &str = "english";

/// Builds executable PostgreSQL statements for one index table.
#[derive(Debug, Clone)]
pub struct PgQueryAssembler {
    table: String,
}

impl PgQueryAssembler {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into() }
    }

    fn compile_filters(
        &self,
        filters: &[FilterNode],
        params: &mut ParamList,
    ) -> Result<Vec<String>, IndexError> {
        let compiler = PgFilterCompiler;
        filters
            .iter()
            .map(|filter| compiler.compile_into(filter, params))
            .collect()
    }

    /// The full SELECT for one search request.
    pub fn search(&self, request: &SearchRequest) -> Result<AssembledQuery, IndexError> {
        super::check_min_score(request)?;
        let t = &self.table;
        let mut params = ParamList::postgres();

        // Both arms cast to float8 so the score column decodes uniformly.
        let (score_expr, tsquery) = match request.trimmed_query() {
            Some(query) => {
                let text = query_text(query, request.options.include_partial_matches);
                let placeholder = params.push(ParamValue::Text(text));
                let tsquery = format!("websearch_to_tsquery('{TS_CONFIG}', {placeholder})");
                (
                    format!("ts_rank(search_vector, {tsquery})::float8"),
                    Some(tsquery),
                )
            }
            None => ("0.0::float8".to_string(), None),
        };

        let mut predicates = Vec::new();
        if let Some(tsquery) = &tsquery {
            predicates.push(format!("search_vector @@ {tsquery}"));
        }
        predicates.extend(self.compile_filters(&request.filters, &mut params)?);
        if tsquery.is_some() && request.options.min_score > 0.0 {
            let placeholder = params.push(ParamValue::Float(request.options.min_score));
            predicates.push(format!("{score_expr} >= {placeholder}"));
        }
        let where_clause = if predicates.is_empty() {
            "TRUE".to_string()
        } else {
            predicates.join(" AND ")
        };

        let relevance_key = tsquery.is_some().then_some(score_expr.as_str());
        let order_clause = self.order_clause(&request.order_by, relevance_key)?;
        let limit = params.push(ParamValue::Integer(request.options.take as i64));
        let offset = params.push(ParamValue::Integer(request.options.skip as i64));

        let sql = format!(
            "SELECT id, document, last_updated, {score_expr} AS score, \
             COUNT(*) OVER () AS total_count \
             FROM {t} WHERE {where_clause} \
             ORDER BY {order_clause} LIMIT {limit} OFFSET {offset}"
        );
        Ok(AssembledQuery { sql, params })
    }

    /// Window count for the same matched set, before pagination.
    pub fn count(&self, request: &SearchRequest) -> Result<AssembledQuery, IndexError> {
        super::check_min_score(request)?;
        let t = &self.table;
        let mut params = ParamList::postgres();

        let mut predicates = Vec::new();
        let tsquery = match request.trimmed_query() {
            Some(query) => {
                let text = query_text(query, request.options.include_partial_matches);
                let placeholder = params.push(ParamValue::Text(text));
                let tsquery = format!("websearch_to_tsquery('{TS_CONFIG}', {placeholder})");
                predicates.push(format!("search_vector @@ {tsquery}"));
                Some(tsquery)
            }
            None => None,
        };
        predicates.extend(self.compile_filters(&request.filters, &mut params)?);
        if let Some(tsquery) = &tsquery {
            if request.options.min_score > 0.0 {
                let placeholder = params.push(ParamValue::Float(request.options.min_score));
                predicates.push(format!(
                    "ts_rank(search_vector, {tsquery}) >= {placeholder}"
                ));
            }
        }
        let where_clause = if predicates.is_empty() {
            "TRUE".to_string()
        } else {
            predicates.join(" AND ")
        };

        let sql = format!("SELECT COUNT(*) AS total FROM {t} WHERE {where_clause}");
        Ok(AssembledQuery { sql, params })
    }

    /// Targeted deletion by compiled filters.
    pub fn delete_where(&self, filters: &[FilterNode]) -> Result<AssembledQuery, IndexError> {
        if filters.is_empty() {
            return Err(IndexError::Usage(
                "delete_where called with no filters; use clear() to remove every document"
                    .to_string(),
            ));
        }
        let mut params = ParamList::postgres();
        let predicates = self.compile_filters(filters, &mut params)?;
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.table,
            predicates.join(" AND ")
        );
        Ok(AssembledQuery { sql, params })
    }

    fn order_clause(
        &self,
        order_by: &[OrderBy],
        relevance_key: Option<&str>,
    ) -> Result<String, IndexError> {
        let mut keys = Vec::with_capacity(order_by.len() + 1);
        if order_by.is_empty() {
            // Without a query the score is constant and PostgreSQL rejects
            // non-integer constants in ORDER BY; the id tie-break carries it.
            if let Some(score_expr) = relevance_key {
                keys.push(format!("{score_expr} DESC"));
            }
        } else {
            for order in order_by {
                check_property(&order.property)?;
                let direction = match order.direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                };
                // Order on the jsonb value, not its text form: jsonb
                // comparison sorts numbers numerically, where ->> would sort
                // "1400" before "600".
                keys.push(format!("(document -> '{}') {direction}", order.property));
            }
        }
        keys.push("id ASC".to_string());
        Ok(keys.join(", "))
    }
}

/// Shape the raw query text for `websearch_to_tsquery`.
///
/// websearch syntax ANDs bare terms, so any-term matching rejoins the terms
/// with its `or` keyword. Phrase matching wraps the whole query in double
/// quotes, which websearch treats as an adjacency phrase.
fn query_text(query: &str, partial: bool) -> String {
    if partial {
        query.split_whitespace().collect::<Vec<_>>().join(" or ")
    } else {
        format!("\"{}\"", query.replace('"', " "))
    }
}

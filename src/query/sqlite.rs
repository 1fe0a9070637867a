// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite query assembler.
//!
//! Relevance comes from a paired FTS5 shadow table joined in as a subquery:
//!
//! ```sql
//! SELECT docs.id, docs.document, docs.last_updated, fts.score,
//!        COUNT(*) OVER () AS total_count
//! FROM docs
//! JOIN (SELECT id, -rank AS score FROM docs_fts WHERE docs_fts MATCH ?1) fts
//!   ON fts.id = docs.id
//! WHERE ... ORDER BY ... LIMIT ?n OFFSET ?m
//! ```
//!
//! FTS5 rank is negative-is-better; the sign is inverted in the subquery so
//! scores read "higher is better" uniformly with the PostgreSQL backend.
//! When the request carries no query text the join is bypassed entirely and
//! a pure filter query runs instead (the relevance join would otherwise
//! degenerate and return nothing).

use super::{AssembledQuery, OrderBy, SearchRequest, SortDirection};
use crate::error::IndexError;
use crate::filter::{
    check_property, FilterCompiler, FilterNode, ParamList, ParamValue, SqliteFilterCompiler,
};

/// Builds executable SQLite statements for one index table.
#[derive(Debug, Clone)]
pub struct SqliteQueryAssembler {
    table: String,
    fts_table: String,
}

impl SqliteQueryAssembler {
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        let fts_table = format!("{table}_fts");
        Self { table, fts_table }
    }

    pub fn fts_table(&self) -> &str {
        &self.fts_table
    }

    fn compile_filters(
        &self,
        filters: &[FilterNode],
        params: &mut ParamList,
    ) -> Result<Vec<String>, IndexError> {
        let compiler = SqliteFilterCompiler;
        filters
            .iter()
            .map(|filter| compiler.compile_into(filter, params))
            .collect()
    }

    /// The full SELECT for one search request.
    pub fn search(&self, request: &SearchRequest) -> Result<AssembledQuery, IndexError> {
        super::check_min_score(request)?;
        let t = &self.table;
        let mut params = ParamList::sqlite();

        let (score_expr, join) = match request.trimmed_query() {
            Some(query) => {
                let expr = match_expression(query, request.options.include_partial_matches);
                let placeholder = params.push(ParamValue::Text(expr));
                (
                    "fts.score".to_string(),
                    format!(
                        " JOIN (SELECT id, -rank AS score FROM {fts} WHERE {fts} MATCH {placeholder}) fts ON fts.id = {t}.id",
                        fts = self.fts_table
                    ),
                )
            }
            None => ("0.0".to_string(), String::new()),
        };

        let mut predicates = self.compile_filters(&request.filters, &mut params)?;
        if request.trimmed_query().is_some() && request.options.min_score > 0.0 {
            let placeholder = params.push(ParamValue::Float(request.options.min_score));
            predicates.push(format!("fts.score >= {placeholder}"));
        }
        let where_clause = if predicates.is_empty() {
            "1".to_string()
        } else {
            predicates.join(" AND ")
        };

        let relevance_key = request
            .trimmed_query()
            .is_some()
            .then_some(score_expr.as_str());
        let order_clause = self.order_clause(&request.order_by, relevance_key)?;
        let limit = params.push(ParamValue::Integer(request.options.take as i64));
        let offset = params.push(ParamValue::Integer(request.options.skip as i64));

        let sql = format!(
            "SELECT {t}.id AS id, {t}.document AS document, {t}.last_updated AS last_updated, \
             {score_expr} AS score, COUNT(*) OVER () AS total_count \
             FROM {t}{join} WHERE {where_clause} \
             ORDER BY {order_clause} LIMIT {limit} OFFSET {offset}"
        );
        Ok(AssembledQuery { sql, params })
    }

    /// Window count for the same matched set, before pagination.
    pub fn count(&self, request: &SearchRequest) -> Result<AssembledQuery, IndexError> {
        super::check_min_score(request)?;
        let t = &self.table;
        let mut params = ParamList::sqlite();

        let join = match request.trimmed_query() {
            Some(query) => {
                let expr = match_expression(query, request.options.include_partial_matches);
                let placeholder = params.push(ParamValue::Text(expr));
                format!(
                    " JOIN (SELECT id, -rank AS score FROM {fts} WHERE {fts} MATCH {placeholder}) fts ON fts.id = {t}.id",
                    fts = self.fts_table
                )
            }
            None => String::new(),
        };

        let mut predicates = self.compile_filters(&request.filters, &mut params)?;
        if request.trimmed_query().is_some() && request.options.min_score > 0.0 {
            let placeholder = params.push(ParamValue::Float(request.options.min_score));
            predicates.push(format!("fts.score >= {placeholder}"));
        }
        let where_clause = if predicates.is_empty() {
            "1".to_string()
        } else {
            predicates.join(" AND ")
        };

        let sql = format!("SELECT COUNT(*) AS total FROM {t}{join} WHERE {where_clause}");
        Ok(AssembledQuery { sql, params })
    }

    /// Targeted deletion by compiled filters.
    ///
    /// An empty filter set is rejected before any statement executes; the
    /// explicit clear-all operation exists for that.
    pub fn delete_where(&self, filters: &[FilterNode]) -> Result<AssembledQuery, IndexError> {
        if filters.is_empty() {
            return Err(IndexError::Usage(
                "delete_where called with no filters; use clear() to remove every document"
                    .to_string(),
            ));
        }
        let mut params = ParamList::sqlite();
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
            // Without a query every score is constant; the id tie-break is
            // the only meaningful default key.
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
                keys.push(format!(
                    "json_extract(document, '$.{}') {direction}",
                    order.property
                ));
            }
        }
        // Deterministic tie-break keeps pagination windows stable.
        keys.push(format!("{}.id ASC", self.table));
        Ok(keys.join(", "))
    }
}

/// Build the FTS5 MATCH operand.
///
/// Partial matching splits the query into individually quoted terms OR'd
/// together so any term match counts; otherwise the whole query is one
/// quoted phrase. Quoting also neutralizes FTS5 query syntax in user input.
fn match_expression(query: &str, partial: bool) -> String {
    let quote = |term: &str| format!("\"{}\"", term.replace('"', "\"\""));
    if partial {
        query
            .split_whitespace()
            .map(quote)
            .collect::<Vec<_>>()
            .join(" OR ")
    } else {
        quote(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::field;

    fn assembler() -> SqliteQueryAssembler {
        SqliteQueryAssembler::new("search_book_library")
    }

    #[test]
    fn test_match_expression_partial_terms() {
        assert_eq!(
            match_expression("rust async runtime", true),
            "\"rust\" OR \"async\" OR \"runtime\""
        );
    }

    #[test]
    fn test_match_expression_phrase() {
        assert_eq!(match_expression("rust async", false), "\"rust async\"");
    }

    #[test]
    fn test_match_expression_escapes_quotes() {
        assert_eq!(match_expression("say \"hi\"", false), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_search_with_query_joins_fts() {
        let request = SearchRequest::new().with_query("cats");
        let assembled = assembler().search(&request).unwrap();
        assert!(assembled
            .sql
            .contains("JOIN (SELECT id, -rank AS score FROM search_book_library_fts"));
        assert!(assembled.sql.contains("search_book_library_fts MATCH ?1"));
        assert!(assembled.sql.contains("COUNT(*) OVER () AS total_count"));
        assert!(assembled.sql.contains("ORDER BY fts.score DESC"));
        // match expression + limit + offset
        assert_eq!(assembled.params.len(), 3);
    }

    #[test]
    fn test_search_without_query_bypasses_fts() {
        let request = SearchRequest::new().filter(field("pages").gt(100));
        let assembled = assembler().search(&request).unwrap();
        assert!(!assembled.sql.contains("JOIN"));
        assert!(!assembled.sql.contains("MATCH"));
        assert!(assembled.sql.contains("0.0 AS score"));
        assert!(assembled
            .sql
            .contains("CAST(json_extract(document, '$.pages') AS INTEGER) > ?1"));
    }

    #[test]
    fn test_search_no_query_no_filters_is_true_predicate() {
        let assembled = assembler().search(&SearchRequest::new()).unwrap();
        assert!(assembled.sql.contains("WHERE 1 "));
    }

    #[test]
    fn test_min_score_requires_query() {
        let with_query = SearchRequest::new().with_query("cats").min_score(0.5);
        let assembled = assembler().search(&with_query).unwrap();
        assert!(assembled.sql.contains("fts.score >= ?2"));

        // Without query text there is no score to threshold on; that request
        // is a caller mistake, not an empty result set.
        let without_query = SearchRequest::new().min_score(0.5);
        let err = assembler().search(&without_query).unwrap_err();
        assert!(matches!(err, IndexError::Usage(_)));
        let err = assembler().count(&without_query).unwrap_err();
        assert!(matches!(err, IndexError::Usage(_)));
    }

    #[test]
    fn test_multiple_filters_are_anded_with_distinct_params() {
        let request = SearchRequest::new()
            .filter(field("status").eq("published"))
            .filter(field("pages").gt(50));
        let assembled = assembler().search(&request).unwrap();
        assert!(assembled.sql.contains("= ?1 AND "));
        assert!(assembled.sql.contains("> ?2"));
        let names: Vec<_> = assembled
            .params
            .params()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_explicit_ordering_with_tiebreak_chain() {
        let request = SearchRequest::new()
            .order_by(OrderBy::desc("pages"))
            .order_by(OrderBy::asc("title"));
        let assembled = assembler().search(&request).unwrap();
        assert!(assembled.sql.contains(
            "ORDER BY json_extract(document, '$.pages') DESC, \
             json_extract(document, '$.title') ASC, search_book_library.id ASC"
        ));
    }

    #[test]
    fn test_pagination_is_parameterized() {
        let request = SearchRequest::new().skip(40).take(20);
        let assembled = assembler().search(&request).unwrap();
        assert!(assembled.sql.ends_with("LIMIT ?1 OFFSET ?2"));
        let values: Vec<_> = assembled
            .params
            .params()
            .iter()
            .map(|p| p.value.clone())
            .collect();
        assert_eq!(values, vec![ParamValue::Integer(20), ParamValue::Integer(40)]);
    }

    #[test]
    fn test_count_has_no_window_or_pagination() {
        let request = SearchRequest::new().with_query("cats").take(5);
        let assembled = assembler().count(&request).unwrap();
        assert!(assembled.sql.starts_with("SELECT COUNT(*) AS total"));
        assert!(!assembled.sql.contains("LIMIT"));
    }

    #[test]
    fn test_delete_where_rejects_empty_filters() {
        let err = assembler().delete_where(&[]).unwrap_err();
        assert!(matches!(err, IndexError::Usage(_)));
        assert!(err.to_string().contains("clear()"));
    }

    #[test]
    fn test_delete_where_builds_delete() {
        let assembled = assembler()
            .delete_where(&[field("status").eq("draft")])
            .unwrap();
        assert_eq!(
            assembled.sql,
            "DELETE FROM search_book_library WHERE CAST(json_extract(document, '$.status') AS TEXT) = ?1"
        );
    }

    #[test]
    fn test_hostile_order_property_rejected() {
        let request = SearchRequest::new().order_by(OrderBy::asc("x; DROP TABLE t"));
        let err = assembler().search(&request).unwrap_err();
        assert!(matches!(err, IndexError::InvalidProperty(_)));
    }
}

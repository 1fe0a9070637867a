// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite dialect renderer.
//!
//! Fields are reached with `json_extract(document, '$.prop')` and cast to the
//! SQLite storage class implied by the declared property type. JSON booleans
//! extract as 0/1, so `Boolean` shares the INTEGER cast. Timestamps are
//! normalized with `strftime` to fixed millisecond text before comparing;
//! raw RFC 3339 values carry varying fractional precision, and mixed
//! precision breaks lexical ordering (`'.'` sorts before `'Z'`). The bound
//! operand is formatted to the same shape on the Rust side.
//!
//! # SQL generated
//!
//! ```sql
//! CAST(json_extract(document, '$.age') AS INTEGER) >= ?1
//! CAST(json_extract(document, '$.title') AS TEXT) GLOB ?2
//! lower(CAST(json_extract(document, '$.name') AS TEXT)) LIKE lower(?3) ESCAPE '\'
//! strftime('%Y-%m-%dT%H:%M:%f', json_extract(document, '$.created_at')) < ?4
//! json_extract(document, '$.deleted_at') IS NULL
//! CAST(json_extract(document, '$.tier') AS TEXT) IN (?5, ?6)
//! ```

use super::{
    check_property, escape_glob, escape_like, FilterCompiler, FilterNode, FilterValue,
    LogicalOperator, Operator, ParamList, ParamValue, PropertyType,
};
use crate::error::IndexError;

/// Renders [`FilterNode`] trees into SQLite WHERE fragments.
pub struct SqliteFilterCompiler;

impl SqliteFilterCompiler {
    fn extract(property: &str) -> String {
        format!("json_extract(document, '$.{property}')")
    }

    fn cast(property: &str, property_type: PropertyType) -> String {
        let extracted = Self::extract(property);
        match property_type {
            PropertyType::Integer | PropertyType::Boolean => {
                format!("CAST({extracted} AS INTEGER)")
            }
            PropertyType::Float => format!("CAST({extracted} AS REAL)"),
            PropertyType::Text => format!("CAST({extracted} AS TEXT)"),
            // Fixed-width millisecond text regardless of the stored
            // fractional precision; the bound operand matches this shape.
            PropertyType::Timestamp => {
                format!("strftime('%Y-%m-%dT%H:%M:%f', {extracted})")
            }
        }
    }

    /// Tab, CR and LF normalized to space, then trimmed. An ASCII
    /// approximation of the host notion of whitespace, not Unicode-exact.
    fn whitespace_folded(property: &str) -> String {
        let extracted = Self::extract(property);
        format!(
            "TRIM(REPLACE(REPLACE(REPLACE(CAST({extracted} AS TEXT), char(9), ' '), char(13), ' '), char(10), ' '))"
        )
    }

    fn condition(
        &self,
        property: &str,
        property_type: PropertyType,
        operator: Operator,
        value: &FilterValue,
        params: &mut ParamList,
    ) -> Result<String, IndexError> {
        check_property(property)?;
        let unsupported = || IndexError::UnsupportedFilter {
            property: property.to_string(),
            property_type,
            operator,
        };

        match operator {
            Operator::IsNull => Ok(format!("{} IS NULL", Self::extract(property))),
            Operator::IsNotNull => Ok(format!("{} IS NOT NULL", Self::extract(property))),
            Operator::IsNullOrEmpty => {
                let e = Self::extract(property);
                let text = Self::cast(property, PropertyType::Text);
                Ok(format!("({e} IS NULL OR {text} = '')"))
            }
            Operator::IsNotNullOrEmpty => {
                let e = Self::extract(property);
                let text = Self::cast(property, PropertyType::Text);
                Ok(format!("({e} IS NOT NULL AND {text} <> '')"))
            }
            Operator::IsNullOrWhiteSpace => {
                let e = Self::extract(property);
                let folded = Self::whitespace_folded(property);
                Ok(format!("({e} IS NULL OR {folded} = '')"))
            }
            Operator::IsNotNullOrWhiteSpace => {
                let e = Self::extract(property);
                let folded = Self::whitespace_folded(property);
                Ok(format!("({e} IS NOT NULL AND {folded} <> '')"))
            }

            Operator::Equal
            | Operator::NotEqual
            | Operator::GreaterThan
            | Operator::GreaterThanOrEqual
            | Operator::LessThan
            | Operator::LessThanOrEqual => {
                let ordering = !matches!(operator, Operator::Equal | Operator::NotEqual);
                if ordering && property_type == PropertyType::Boolean {
                    return Err(unsupported());
                }
                let bound = value.as_param().ok_or_else(unsupported)?;
                let token = match operator {
                    Operator::Equal => "=",
                    Operator::NotEqual => "<>",
                    Operator::GreaterThan => ">",
                    Operator::GreaterThanOrEqual => ">=",
                    Operator::LessThan => "<",
                    Operator::LessThanOrEqual => "<=",
                    _ => unreachable!(),
                };
                let placeholder = params.push(bound);
                Ok(format!(
                    "{} {token} {placeholder}",
                    Self::cast(property, property_type)
                ))
            }

            Operator::Contains
            | Operator::NotContains
            | Operator::ContainsIgnoreCase
            | Operator::NotContainsIgnoreCase
            | Operator::StartsWith
            | Operator::NotStartsWith
            | Operator::StartsWithIgnoreCase
            | Operator::NotStartsWithIgnoreCase
            | Operator::EndsWith
            | Operator::NotEndsWith
            | Operator::EndsWithIgnoreCase
            | Operator::NotEndsWithIgnoreCase => {
                self.pattern(property, property_type, operator, value, params)
            }

            Operator::In | Operator::NotIn => {
                self.membership(property, property_type, operator, value, params)
            }
        }
    }

    fn pattern(
        &self,
        property: &str,
        property_type: PropertyType,
        operator: Operator,
        value: &FilterValue,
        params: &mut ParamList,
    ) -> Result<String, IndexError> {
        let unsupported = || IndexError::UnsupportedFilter {
            property: property.to_string(),
            property_type,
            operator,
        };
        if property_type != PropertyType::Text {
            return Err(unsupported());
        }
        let FilterValue::Text(operand) = value else {
            return Err(unsupported());
        };

        let ignore_case = matches!(
            operator,
            Operator::ContainsIgnoreCase
                | Operator::NotContainsIgnoreCase
                | Operator::StartsWithIgnoreCase
                | Operator::NotStartsWithIgnoreCase
                | Operator::EndsWithIgnoreCase
                | Operator::NotEndsWithIgnoreCase
        );
        let negated = matches!(
            operator,
            Operator::NotContains
                | Operator::NotContainsIgnoreCase
                | Operator::NotStartsWith
                | Operator::NotStartsWithIgnoreCase
                | Operator::NotEndsWith
                | Operator::NotEndsWithIgnoreCase
        );
        let contains = matches!(
            operator,
            Operator::Contains
                | Operator::NotContains
                | Operator::ContainsIgnoreCase
                | Operator::NotContainsIgnoreCase
        );
        let prefix = matches!(
            operator,
            Operator::StartsWith
                | Operator::NotStartsWith
                | Operator::StartsWithIgnoreCase
                | Operator::NotStartsWithIgnoreCase
        );

        // LIKE is ASCII-case-insensitive in SQLite, so the case-sensitive
        // variants go through GLOB and only the IgnoreCase family uses LIKE.
        let (escaped, wildcard) = if ignore_case {
            (escape_like(operand), "%")
        } else {
            (escape_glob(operand), "*")
        };
        let pattern = if contains {
            format!("{wildcard}{escaped}{wildcard}")
        } else if prefix {
            format!("{escaped}{wildcard}")
        } else {
            format!("{wildcard}{escaped}")
        };

        let placeholder = params.push(ParamValue::Text(pattern));
        let text = Self::cast(property, PropertyType::Text);
        let matched = if ignore_case {
            format!("lower({text}) LIKE lower({placeholder}) ESCAPE '\\'")
        } else {
            format!("{text} GLOB {placeholder}")
        };

        if negated {
            // Complement of the positive form: NULL fields count as non-matching.
            let e = Self::extract(property);
            Ok(format!("({e} IS NULL OR NOT ({matched}))"))
        } else {
            Ok(matched)
        }
    }

    fn membership(
        &self,
        property: &str,
        property_type: PropertyType,
        operator: Operator,
        value: &FilterValue,
        params: &mut ParamList,
    ) -> Result<String, IndexError> {
        let unsupported = || IndexError::UnsupportedFilter {
            property: property.to_string(),
            property_type,
            operator,
        };
        let FilterValue::List(items) = value else {
            return Err(unsupported());
        };
        let negated = operator == Operator::NotIn;
        if items.is_empty() {
            // Membership in the empty set is vacuously false.
            return Ok(if negated { "1=1" } else { "1=0" }.to_string());
        }

        let mut placeholders = Vec::with_capacity(items.len());
        for item in items {
            let bound = item.as_param().ok_or_else(unsupported)?;
            placeholders.push(params.push(bound));
        }
        let token = if negated { "NOT IN" } else { "IN" };
        Ok(format!(
            "{} {token} ({})",
            Self::cast(property, property_type),
            placeholders.join(", ")
        ))
    }
}

impl FilterCompiler for SqliteFilterCompiler {
    fn param_list(&self) -> ParamList {
        ParamList::sqlite()
    }

    fn compile_into(
        &self,
        node: &FilterNode,
        params: &mut ParamList,
    ) -> Result<String, IndexError> {
        match node {
            FilterNode::Group { operator, children } => {
                if children.is_empty() {
                    return Ok("1".to_string());
                }
                if children.len() == 1 {
                    return self.compile_into(&children[0], params);
                }
                let parts = children
                    .iter()
                    .map(|child| self.compile_into(child, params))
                    .collect::<Result<Vec<_>, _>>()?;
                let joiner = match operator {
                    LogicalOperator::And => " AND ",
                    LogicalOperator::Or => " OR ",
                };
                Ok(format!("({})", parts.join(joiner)))
            }
            FilterNode::Condition {
                property,
                property_type,
                operator,
                value,
            } => self.condition(property, *property_type, *operator, value, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::field;

    fn compile(node: &FilterNode) -> (String, Vec<ParamValue>) {
        let clause = SqliteFilterCompiler.compile(node).unwrap();
        let values = clause.params.into_iter().map(|p| p.value).collect();
        (clause.sql, values)
    }

    #[test]
    fn test_equal_text() {
        let (sql, params) = compile(&field("name").eq("Alice"));
        assert_eq!(
            sql,
            "CAST(json_extract(document, '$.name') AS TEXT) = ?1"
        );
        assert_eq!(params, vec![ParamValue::Text("Alice".to_string())]);
    }

    #[test]
    fn test_integer_comparison_casts() {
        let (sql, params) = compile(&field("age").gte(21));
        assert_eq!(
            sql,
            "CAST(json_extract(document, '$.age') AS INTEGER) >= ?1"
        );
        assert_eq!(params, vec![ParamValue::Integer(21)]);
    }

    #[test]
    fn test_float_comparison_casts_real() {
        let (sql, _) = compile(&field("rating").lt(4.5));
        assert_eq!(sql, "CAST(json_extract(document, '$.rating') AS REAL) < ?1");
    }

    #[test]
    fn test_null_operators_bind_nothing() {
        let (sql, params) = compile(&field("deleted_at").is_null());
        assert_eq!(sql, "json_extract(document, '$.deleted_at') IS NULL");
        assert!(params.is_empty());

        let (sql, params) = compile(&field("deleted_at").is_not_null());
        assert_eq!(sql, "json_extract(document, '$.deleted_at') IS NOT NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_null_or_empty_expansion() {
        let (sql, params) = compile(&field("nick").is_null_or_empty());
        assert_eq!(
            sql,
            "(json_extract(document, '$.nick') IS NULL OR CAST(json_extract(document, '$.nick') AS TEXT) = '')"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_whitespace_expansion_folds_ascii_controls() {
        let (sql, _) = compile(&field("nick").is_null_or_whitespace());
        assert!(sql.contains("char(9)"));
        assert!(sql.contains("char(13)"));
        assert!(sql.contains("char(10)"));
        assert!(sql.starts_with("(json_extract(document, '$.nick') IS NULL OR TRIM("));
        assert!(sql.ends_with("= '')"));
    }

    #[test]
    fn test_contains_uses_glob_and_escapes_pattern() {
        let (sql, params) = compile(&field("title").contains("v2?*[beta]"));
        assert_eq!(sql, "CAST(json_extract(document, '$.title') AS TEXT) GLOB ?1");
        assert_eq!(
            params,
            vec![ParamValue::Text("*v2[?][*][[]beta]*".to_string())]
        );
    }

    #[test]
    fn test_starts_and_ends_with_patterns() {
        let (_, params) = compile(&field("title").starts_with("intro"));
        assert_eq!(params, vec![ParamValue::Text("intro*".to_string())]);

        let (_, params) = compile(&field("title").ends_with(".md"));
        assert_eq!(params, vec![ParamValue::Text("*.md".to_string())]);
    }

    #[test]
    fn test_timestamp_comparison_normalizes_precision() {
        let ts = chrono::DateTime::parse_from_rfc3339("2024-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let (sql, _) = compile(&field("created_at").gt(ts));
        assert_eq!(
            sql,
            "strftime('%Y-%m-%dT%H:%M:%f', json_extract(document, '$.created_at')) > ?1"
        );
    }

    #[test]
    fn test_ignore_case_lowers_both_sides() {
        let (sql, _) = compile(&field("title").contains_ignore_case("Rust"));
        assert_eq!(
            sql,
            "lower(CAST(json_extract(document, '$.title') AS TEXT)) LIKE lower(?1) ESCAPE '\\'"
        );
    }

    #[test]
    fn test_negated_pattern_is_complement() {
        let (sql, _) = compile(&field("title").not_contains("draft"));
        assert_eq!(
            sql,
            "(json_extract(document, '$.title') IS NULL OR NOT (CAST(json_extract(document, '$.title') AS TEXT) GLOB ?1))"
        );
    }

    #[test]
    fn test_in_expands_placeholders() {
        let (sql, params) = compile(&field("tier").in_list(vec!["gold", "silver"]));
        assert_eq!(
            sql,
            "CAST(json_extract(document, '$.tier') AS TEXT) IN (?1, ?2)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_empty_in_is_vacuous() {
        let (sql, params) = compile(&field("tier").in_list(Vec::<String>::new()));
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());

        let (sql, _) = compile(&field("tier").not_in_list(Vec::<String>::new()));
        assert_eq!(sql, "1=1");
    }

    #[test]
    fn test_empty_group_is_always_true() {
        let (sql, params) = compile(&FilterNode::and(vec![]));
        assert_eq!(sql, "1");
        assert!(params.is_empty());
    }

    #[test]
    fn test_single_child_group_unwrapped() {
        let (sql, _) = compile(&FilterNode::or(vec![field("age").eq(30)]));
        assert!(!sql.starts_with('('));
    }

    #[test]
    fn test_nested_groups_parenthesized() {
        let node = FilterNode::and(vec![
            field("status").eq("active"),
            FilterNode::or(vec![field("age").lt(30), field("age").gt(60)]),
        ]);
        let (sql, params) = compile(&node);
        assert_eq!(
            sql,
            "(CAST(json_extract(document, '$.status') AS TEXT) = ?1 AND \
             (CAST(json_extract(document, '$.age') AS INTEGER) < ?2 OR \
             CAST(json_extract(document, '$.age') AS INTEGER) > ?3))"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_request_scoped_parameter_names_are_distinct() {
        let filters = vec![
            field("a").eq(1),
            field("b").eq(2),
            FilterNode::or(vec![field("c").eq(3), field("d").in_list(vec![4, 5])]),
        ];
        let compiler = SqliteFilterCompiler;
        let mut params = compiler.param_list();
        for f in &filters {
            compiler.compile_into(f, &mut params).unwrap();
        }
        let names: Vec<_> = params.params().iter().map(|p| p.name.clone()).collect();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(names.len(), 5);
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_ordering_on_boolean_is_unsupported() {
        let err = SqliteFilterCompiler
            .compile(&field("active").gt(true))
            .unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedFilter { .. }));
    }

    #[test]
    fn test_contains_on_non_text_is_unsupported() {
        let node = FilterNode::Condition {
            property: "age".to_string(),
            property_type: PropertyType::Integer,
            operator: Operator::Contains,
            value: FilterValue::Integer(5),
        };
        let err = SqliteFilterCompiler.compile(&node).unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedFilter { .. }));
    }

    #[test]
    fn test_hostile_property_name_rejected() {
        let node = FilterNode::Condition {
            property: "x') OR 1=1 --".to_string(),
            property_type: PropertyType::Text,
            operator: Operator::Equal,
            value: FilterValue::Text("x".to_string()),
        };
        let err = SqliteFilterCompiler.compile(&node).unwrap_err();
        assert!(matches!(err, IndexError::InvalidProperty(_)));
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! PostgreSQL dialect renderer.
//!
//! Fields are reached with the jsonb text-extraction operator
//! `document ->> 'prop'` and cast to the SQL type implied by the declared
//! property type. Case-insensitive pattern matching uses `ILIKE` instead of
//! the lower()-both-sides trick the SQLite renderer needs.
//!
//! # SQL generated
//!
//! ```sql
//! ((document ->> 'age'))::bigint >= $1
//! (document ->> 'name') LIKE $2 ESCAPE '\'
//! (document ->> 'tier') IN ($3, $4)
//! ((document ->> 'created_at'))::timestamptz < $5
//! ```

use super::{
    check_property, escape_like, FilterCompiler, FilterNode, FilterValue, LogicalOperator,
    Operator, ParamList, ParamValue, PropertyType,
};
use crate::error::IndexError;

/// Renders [`FilterNode`] trees into PostgreSQL WHERE fragments.
pub struct PgFilterCompiler;

impl PgFilterCompiler {
    fn extract(property: &str) -> String {
        format!("(document ->> '{property}')")
    }

    fn cast(property: &str, property_type: PropertyType) -> String {
        let extracted = Self::extract(property);
        match property_type {
            PropertyType::Text => extracted,
            PropertyType::Integer => format!("({extracted})::bigint"),
            PropertyType::Float => format!("({extracted})::double precision"),
            PropertyType::Boolean => format!("({extracted})::boolean"),
            PropertyType::Timestamp => format!("({extracted})::timestamptz"),
        }
    }

    /// Tab, CR and LF normalized to space, then trimmed. An ASCII
    /// approximation of the host notion of whitespace, not Unicode-exact.
    fn whitespace_folded(property: &str) -> String {
        let extracted = Self::extract(property);
        format!("btrim(translate({extracted}, E'\\t\\r\\n', '   '))")
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
                Ok(format!("({e} IS NULL OR {e} = '')"))
            }
            Operator::IsNotNullOrEmpty => {
                let e = Self::extract(property);
                Ok(format!("({e} IS NOT NULL AND {e} <> '')"))
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

        let escaped = escape_like(operand);
        let pattern = match operator {
            Operator::Contains
            | Operator::NotContains
            | Operator::ContainsIgnoreCase
            | Operator::NotContainsIgnoreCase => format!("%{escaped}%"),
            Operator::StartsWith
            | Operator::NotStartsWith
            | Operator::StartsWithIgnoreCase
            | Operator::NotStartsWithIgnoreCase => format!("{escaped}%"),
            _ => format!("%{escaped}"),
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

        let placeholder = params.push(ParamValue::Text(pattern));
        let e = Self::extract(property);
        let like = if ignore_case { "ILIKE" } else { "LIKE" };
        let matched = format!("{e} {like} {placeholder} ESCAPE '\\'");

        if negated {
            // Complement of the positive form: NULL fields count as non-matching.
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
            return Ok(if negated { "TRUE" } else { "FALSE" }.to_string());
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

impl FilterCompiler for PgFilterCompiler {
    fn param_list(&self) -> ParamList {
        ParamList::postgres()
    }

    fn compile_into(
        &self,
        node: &FilterNode,
        params: &mut ParamList,
    ) -> Result<String, IndexError> {
        match node {
            FilterNode::Group { operator, children } => {
                if children.is_empty() {
                    return Ok("TRUE".to_string());
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

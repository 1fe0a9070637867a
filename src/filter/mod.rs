// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Filter AST and its compilation interface.
//!
//! A [`FilterNode`] is a small boolean-expression tree over document fields.
//! Application code builds it once with the [`field`] builder and the
//! [`FilterNode::and`] / [`FilterNode::or`] combinators; a dialect-specific
//! [`FilterCompiler`] then renders it into a parameterized SQL fragment.
//!
//! ```text
//! FilterNode (AST)
//!     ↓
//!     ├─→ SqliteFilterCompiler  → json_extract(document, ...) fragments
//!     └─→ PgFilterCompiler      → (document ->> ...) fragments
//! ```
//!
//! The load-bearing safety invariant of the whole compiler lives here: no
//! user-controlled *value* ever appears in SQL text. Values travel as bound
//! parameters issued from a [`ParamList`]; only property names are
//! interpolated, and those are validated against identifier characters first.
//!
//! # Example
//!
//! ```rust
//! use fts_bridge::{field, FilterNode};
//!
//! let filter = FilterNode::and(vec![
//!     field("status").eq("published"),
//!     FilterNode::or(vec![
//!         field("rating").gte(4.0),
//!         field("featured").eq(true),
//!     ]),
//! ]);
//! ```

mod postgres;
mod sqlite;

pub use postgres::PgFilterCompiler;
pub use sqlite::SqliteFilterCompiler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Boolean combinator for [`FilterNode::Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

/// The closed set of leaf predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsNull,
    IsNotNull,
    IsNullOrEmpty,
    IsNotNullOrEmpty,
    IsNullOrWhiteSpace,
    IsNotNullOrWhiteSpace,
    Contains,
    NotContains,
    ContainsIgnoreCase,
    NotContainsIgnoreCase,
    StartsWith,
    NotStartsWith,
    StartsWithIgnoreCase,
    NotStartsWithIgnoreCase,
    EndsWith,
    NotEndsWith,
    EndsWithIgnoreCase,
    NotEndsWithIgnoreCase,
    In,
    NotIn,
}

/// Declared type of a document property, used to pick the dialect cast.
///
/// The document payload is stored untyped (JSON), so comparisons must cast
/// the extraction; comparing without a cast yields lexical-vs-numeric
/// ordering bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

/// A filter operand value.
///
/// `Null` is the placeholder carried by the null-testing operators; the
/// renderers discard it. `List` is only meaningful for `In` / `NotIn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// The property type implied by this value.
    pub fn property_type(&self) -> PropertyType {
        match self {
            FilterValue::Text(_) => PropertyType::Text,
            FilterValue::Integer(_) => PropertyType::Integer,
            FilterValue::Float(_) => PropertyType::Float,
            FilterValue::Boolean(_) => PropertyType::Boolean,
            FilterValue::Timestamp(_) => PropertyType::Timestamp,
            FilterValue::List(items) => items
                .first()
                .map(FilterValue::property_type)
                .unwrap_or(PropertyType::Text),
            FilterValue::Null => PropertyType::Text,
        }
    }

    /// Scalar values become bind parameters; `List` and `Null` do not.
    pub(crate) fn as_param(&self) -> Option<ParamValue> {
        match self {
            FilterValue::Text(v) => Some(ParamValue::Text(v.clone())),
            FilterValue::Integer(v) => Some(ParamValue::Integer(*v)),
            FilterValue::Float(v) => Some(ParamValue::Float(*v)),
            FilterValue::Boolean(v) => Some(ParamValue::Boolean(*v)),
            FilterValue::Timestamp(v) => Some(ParamValue::Timestamp(*v)),
            FilterValue::List(_) | FilterValue::Null => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Integer(i64::from(v))
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Integer(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Boolean(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        FilterValue::Timestamp(v)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        FilterValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Predicate AST: a condition leaf or a boolean group.
///
/// The tree is built fresh per request and never mutated after construction.
/// An empty `Group` is the universally-true predicate, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterNode {
    Condition {
        property: String,
        property_type: PropertyType,
        operator: Operator,
        value: FilterValue,
    },
    Group {
        operator: LogicalOperator,
        children: Vec<FilterNode>,
    },
}

impl FilterNode {
    /// Conjunction of child predicates.
    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::Group {
            operator: LogicalOperator::And,
            children,
        }
    }

    /// Disjunction of child predicates.
    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Group {
            operator: LogicalOperator::Or,
            children,
        }
    }
}

/// Start building a condition over one document property.
pub fn field(name: impl Into<String>) -> Field {
    Field { name: name.into() }
}

/// Builder handle returned by [`field`].
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
}

impl Field {
    fn condition(self, operator: Operator, value: FilterValue) -> FilterNode {
        FilterNode::Condition {
            property_type: value.property_type(),
            property: self.name,
            operator,
            value,
        }
    }

    pub fn eq(self, value: impl Into<FilterValue>) -> FilterNode {
        self.condition(Operator::Equal, value.into())
    }

    pub fn ne(self, value: impl Into<FilterValue>) -> FilterNode {
        self.condition(Operator::NotEqual, value.into())
    }

    pub fn gt(self, value: impl Into<FilterValue>) -> FilterNode {
        self.condition(Operator::GreaterThan, value.into())
    }

    pub fn gte(self, value: impl Into<FilterValue>) -> FilterNode {
        self.condition(Operator::GreaterThanOrEqual, value.into())
    }

    pub fn lt(self, value: impl Into<FilterValue>) -> FilterNode {
        self.condition(Operator::LessThan, value.into())
    }

    pub fn lte(self, value: impl Into<FilterValue>) -> FilterNode {
        self.condition(Operator::LessThanOrEqual, value.into())
    }

    pub fn is_null(self) -> FilterNode {
        self.condition(Operator::IsNull, FilterValue::Null)
    }

    pub fn is_not_null(self) -> FilterNode {
        self.condition(Operator::IsNotNull, FilterValue::Null)
    }

    pub fn is_null_or_empty(self) -> FilterNode {
        self.condition(Operator::IsNullOrEmpty, FilterValue::Null)
    }

    pub fn is_not_null_or_empty(self) -> FilterNode {
        self.condition(Operator::IsNotNullOrEmpty, FilterValue::Null)
    }

    pub fn is_null_or_whitespace(self) -> FilterNode {
        self.condition(Operator::IsNullOrWhiteSpace, FilterValue::Null)
    }

    pub fn is_not_null_or_whitespace(self) -> FilterNode {
        self.condition(Operator::IsNotNullOrWhiteSpace, FilterValue::Null)
    }

    pub fn contains(self, value: impl Into<String>) -> FilterNode {
        self.condition(Operator::Contains, FilterValue::Text(value.into()))
    }

    pub fn not_contains(self, value: impl Into<String>) -> FilterNode {
        self.condition(Operator::NotContains, FilterValue::Text(value.into()))
    }

    pub fn contains_ignore_case(self, value: impl Into<String>) -> FilterNode {
        self.condition(Operator::ContainsIgnoreCase, FilterValue::Text(value.into()))
    }

    pub fn not_contains_ignore_case(self, value: impl Into<String>) -> FilterNode {
        self.condition(
            Operator::NotContainsIgnoreCase,
            FilterValue::Text(value.into()),
        )
    }

    pub fn starts_with(self, value: impl Into<String>) -> FilterNode {
        self.condition(Operator::StartsWith, FilterValue::Text(value.into()))
    }

    pub fn not_starts_with(self, value: impl Into<String>) -> FilterNode {
        self.condition(Operator::NotStartsWith, FilterValue::Text(value.into()))
    }

    pub fn starts_with_ignore_case(self, value: impl Into<String>) -> FilterNode {
        self.condition(
            Operator::StartsWithIgnoreCase,
            FilterValue::Text(value.into()),
        )
    }

    pub fn not_starts_with_ignore_case(self, value: impl Into<String>) -> FilterNode {
        self.condition(
            Operator::NotStartsWithIgnoreCase,
            FilterValue::Text(value.into()),
        )
    }

    pub fn ends_with(self, value: impl Into<String>) -> FilterNode {
        self.condition(Operator::EndsWith, FilterValue::Text(value.into()))
    }

    pub fn not_ends_with(self, value: impl Into<String>) -> FilterNode {
        self.condition(Operator::NotEndsWith, FilterValue::Text(value.into()))
    }

    pub fn ends_with_ignore_case(self, value: impl Into<String>) -> FilterNode {
        self.condition(
            Operator::EndsWithIgnoreCase,
            FilterValue::Text(value.into()),
        )
    }

    pub fn not_ends_with_ignore_case(self, value: impl Into<String>) -> FilterNode {
        self.condition(
            Operator::NotEndsWithIgnoreCase,
            FilterValue::Text(value.into()),
        )
    }

    pub fn in_list<T: Into<FilterValue>>(self, values: Vec<T>) -> FilterNode {
        self.condition(
            Operator::In,
            FilterValue::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in_list<T: Into<FilterValue>>(self, values: Vec<T>) -> FilterNode {
        self.condition(
            Operator::NotIn,
            FilterValue::List(values.into_iter().map(Into::into).collect()),
        )
    }
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

/// A named bound parameter. The name (`p1`, `p2`, ...) tracks the
/// request-scoped counter; the SQL fragment refers to the value through the
/// dialect placeholder for the same index (`?1` / `$1`).
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: ParamValue,
}

/// Placeholder syntax of the target dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    Sqlite,
    Postgres,
}

/// Ordered parameter accumulator, scoped to one whole request compile.
///
/// Every clause of a request draws placeholders from the same list, so
/// parameter names are pairwise distinct across all filters of the request.
#[derive(Debug, Clone)]
pub struct ParamList {
    style: ParamStyle,
    params: Vec<Param>,
}

impl ParamList {
    pub fn sqlite() -> Self {
        Self {
            style: ParamStyle::Sqlite,
            params: Vec::new(),
        }
    }

    pub fn postgres() -> Self {
        Self {
            style: ParamStyle::Postgres,
            params: Vec::new(),
        }
    }

    /// Append a value and return the dialect placeholder that refers to it.
    pub fn push(&mut self, value: ParamValue) -> String {
        let n = self.params.len() + 1;
        let placeholder = match self.style {
            ParamStyle::Sqlite => format!("?{n}"),
            ParamStyle::Postgres => format!("${n}"),
        };
        self.params.push(Param {
            name: format!("p{n}"),
            value,
        });
        placeholder
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Param> {
        self.params
    }

    pub fn style(&self) -> ParamStyle {
        self.style
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// One rendered filter: a SQL fragment plus the parameters it bound.
#[derive(Debug, Clone)]
pub struct CompiledClause {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Narrow interface the two dialect renderers implement. Each backend
/// carries its own exhaustive implementation, selected once per index
/// instance.
pub trait FilterCompiler {
    /// A parameter list in this dialect's placeholder style.
    fn param_list(&self) -> ParamList;

    /// Render one node, issuing parameters from the request-scoped list.
    fn compile_into(
        &self,
        node: &FilterNode,
        params: &mut ParamList,
    ) -> Result<String, IndexError>;

    /// Render one node standalone with a fresh parameter list.
    fn compile(&self, node: &FilterNode) -> Result<CompiledClause, IndexError> {
        let mut params = self.param_list();
        let sql = self.compile_into(node, &mut params)?;
        Ok(CompiledClause {
            sql,
            params: params.into_params(),
        })
    }
}

/// Property names are the only caller-supplied strings interpolated into SQL
/// text, so they are restricted to identifier characters.
pub(crate) fn check_property(name: &str) -> Result<(), IndexError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(IndexError::InvalidProperty(name.to_string()))
    }
}

/// Escape LIKE metacharacters; patterns are rendered with `ESCAPE '\'`.
pub(crate) fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape GLOB metacharacters. GLOB has no ESCAPE clause, so specials are
/// neutralized with single-character classes instead.
pub(crate) fn escape_glob(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

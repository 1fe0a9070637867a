//! Property-based tests for the filter compiler.
//!
//! Random filter trees are compiled for both dialects and the output is
//! checked for structural soundness: compilation never panics, parentheses
//! stay balanced, parameter names stay pairwise distinct, and no raw value
//! text leaks into the SQL.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;

use fts_bridge::filter::{
    FilterCompiler, FilterNode, FilterValue, Operator, PgFilterCompiler, PropertyType,
    SqliteFilterCompiler,
};

// =============================================================================
// Strategies
// =============================================================================

const CANARY: &str = "zq9_canary_zq9";

fn property_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,15}"
}

fn scalar_value_strategy() -> impl Strategy<Value = FilterValue> {
    prop_oneof![
        // Text values carry a canary so leakage into SQL is detectable.
        "[ -~]{0,20}".prop_map(|s| FilterValue::Text(format!("{CANARY}{s}"))),
        any::<i64>().prop_map(FilterValue::Integer),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(FilterValue::Float),
        any::<bool>().prop_map(FilterValue::Boolean),
    ]
}

fn comparison_operator_strategy() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Equal),
        Just(Operator::NotEqual),
        Just(Operator::GreaterThan),
        Just(Operator::GreaterThanOrEqual),
        Just(Operator::LessThan),
        Just(Operator::LessThanOrEqual),
    ]
}

fn pattern_operator_strategy() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Contains),
        Just(Operator::NotContains),
        Just(Operator::ContainsIgnoreCase),
        Just(Operator::StartsWith),
        Just(Operator::NotStartsWith),
        Just(Operator::EndsWith),
        Just(Operator::EndsWithIgnoreCase),
    ]
}

fn null_operator_strategy() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::IsNull),
        Just(Operator::IsNotNull),
        Just(Operator::IsNullOrEmpty),
        Just(Operator::IsNotNullOrEmpty),
        Just(Operator::IsNullOrWhiteSpace),
        Just(Operator::IsNotNullOrWhiteSpace),
    ]
}

fn condition_strategy() -> impl Strategy<Value = FilterNode> {
    prop_oneof![
        // Typed comparison
        (
            property_strategy(),
            comparison_operator_strategy(),
            scalar_value_strategy()
        )
            .prop_map(|(property, operator, value)| FilterNode::Condition {
                property_type: value.property_type(),
                property,
                operator,
                value,
            }),
        // Text pattern
        (
            property_strategy(),
            pattern_operator_strategy(),
            "[ -~]{0,20}"
        )
            .prop_map(|(property, operator, text)| FilterNode::Condition {
                property_type: PropertyType::Text,
                property,
                operator,
                value: FilterValue::Text(format!("{CANARY}{text}")),
            }),
        // Null check
        (property_strategy(), null_operator_strategy()).prop_map(|(property, operator)| {
            FilterNode::Condition {
                property_type: PropertyType::Text,
                property,
                operator,
                value: FilterValue::Null,
            }
        }),
        // Membership
        (
            property_strategy(),
            prop_oneof![Just(Operator::In), Just(Operator::NotIn)],
            prop::collection::vec(scalar_value_strategy(), 0..5)
        )
            .prop_map(|(property, operator, values)| FilterNode::Condition {
                property_type: values
                    .first()
                    .map(FilterValue::property_type)
                    .unwrap_or(PropertyType::Text),
                property,
                operator,
                value: FilterValue::List(values),
            }),
    ]
}

fn filter_tree_strategy() -> impl Strategy<Value = FilterNode> {
    condition_strategy().prop_recursive(4, 32, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_flat_map(|children| {
            prop_oneof![
                Just(FilterNode::and(children.clone())),
                Just(FilterNode::or(children)),
            ]
        })
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn balanced_parens(sql: &str) -> bool {
    let mut depth = 0i64;
    let mut in_string = false;
    for ch in sql.chars() {
        match ch {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_string
}

fn check_compiled(compiler: &dyn FilterCompiler, node: &FilterNode) {
    let mut params = compiler.param_list();
    match compiler.compile_into(node, &mut params) {
        Ok(sql) => {
            assert!(!sql.is_empty(), "empty sql fragment");
            assert!(balanced_parens(&sql), "unbalanced parens: {sql}");
            assert!(!sql.contains(CANARY), "value text leaked into sql: {sql}");
            let mut names: Vec<_> = params.params().iter().map(|p| p.name.clone()).collect();
            let total = names.len();
            names.sort();
            names.dedup();
            assert!(names.len() == total, "duplicate parameter names");
        }
        // Clean structured errors are acceptable; panics are not.
        Err(_) => {}
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn compile_never_panics_and_stays_structurally_sound(node in filter_tree_strategy()) {
        check_compiled(&SqliteFilterCompiler, &node);
        check_compiled(&PgFilterCompiler, &node);
    }

    #[test]
    fn both_dialects_agree_on_parameter_count(node in filter_tree_strategy()) {
        let mut sqlite_params = SqliteFilterCompiler.param_list();
        let mut pg_params = PgFilterCompiler.param_list();
        let sqlite = SqliteFilterCompiler.compile_into(&node, &mut sqlite_params);
        let pg = PgFilterCompiler.compile_into(&node, &mut pg_params);

        // The dialects reject exactly the same trees, and bind the same
        // number of values when they accept one.
        prop_assert_eq!(sqlite.is_ok(), pg.is_ok());
        if sqlite.is_ok() {
            prop_assert_eq!(sqlite_params.len(), pg_params.len());
        }
    }

    #[test]
    fn filter_trees_round_trip_through_serde(node in filter_tree_strategy()) {
        let json = serde_json::to_string(&node).unwrap();
        let decoded: FilterNode = serde_json::from_str(&json).unwrap();

        let mut a = SqliteFilterCompiler.param_list();
        let mut b = SqliteFilterCompiler.param_list();
        let original = SqliteFilterCompiler.compile_into(&node, &mut a);
        let reparsed = SqliteFilterCompiler.compile_into(&decoded, &mut b);
        match (original, reparsed) {
            (Ok(x), Ok(y)) => prop_assert_eq!(x, y),
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "round trip changed compile outcome"),
        }
    }

    #[test]
    fn hostile_property_names_never_reach_sql(name in "[ -~]{1,24}") {
        let node = FilterNode::Condition {
            property: name.clone(),
            property_type: PropertyType::Text,
            operator: Operator::Equal,
            value: FilterValue::Text("x".to_string()),
        };
        let mut params = SqliteFilterCompiler.param_list();
        if let Ok(sql) = SqliteFilterCompiler.compile_into(&node, &mut params) {
            // Accepted names are identifier-only, so they embed verbatim.
            prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            prop_assert!(sql.contains(&name));
        }
    }
}

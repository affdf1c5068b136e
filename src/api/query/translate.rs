//! Filter expression -> query description translation
//!
//! Top-level `And`s are unwrapped into separate clauses (the server ANDs all
//! top-level conditions). Every other group is kept as declared, so
//! AND-of-ORs and OR-of-ANDs never collapse into each other. Field names and
//! values are forwarded as opaque strings.

use super::description::{Clause, Logic, Operator};
use super::filters::{Filter, FilterValue};

/// Translate the filters accumulated on a query
pub fn translate_filters(filters: &[Filter]) -> Vec<Clause> {
    let mut clauses = Vec::new();
    for filter in filters {
        translate_root(filter, &mut clauses);
    }
    clauses
}

fn translate_root(filter: &Filter, clauses: &mut Vec<Clause>) {
    match filter {
        Filter::And(children) => {
            for child in children {
                translate_root(child, clauses);
            }
        }
        other => clauses.push(translate_filter(other)),
    }
}

/// Translate a single filter, keeping any group it forms
pub fn translate_filter(filter: &Filter) -> Clause {
    match filter {
        Filter::Eq(field, FilterValue::Null) | Filter::IsNull(field) => condition(field, Operator::Null, &[]),
        Filter::NotNull(field) => condition(field, Operator::NotNull, &[]),
        Filter::Eq(field, value) => condition(field, Operator::Eq, std::slice::from_ref(value)),
        Filter::Gt(field, value) => condition(field, Operator::Gt, std::slice::from_ref(value)),
        Filter::Lt(field, value) => condition(field, Operator::Lt, std::slice::from_ref(value)),
        Filter::In(field, values) => condition(field, Operator::In, values),
        Filter::NotIn(field, values) => condition(field, Operator::NotIn, values),
        Filter::Between(field, low, high) => condition(field, Operator::Between, &[low.clone(), high.clone()]),
        Filter::DateRange(field, from, to) => condition(field, Operator::DateRange, &[from.clone(), to.clone()]),
        Filter::And(children) => Clause::Group {
            logic: Logic::And,
            clauses: children.iter().map(translate_filter).collect(),
        },
        Filter::Or(children) => Clause::Group {
            logic: Logic::Or,
            clauses: children.iter().map(translate_filter).collect(),
        },
        Filter::Related(related) => Clause::Relationship {
            relationship: related.relationship.clone(),
            exists: related.exists,
            conditions: translate_filters(&related.conditions),
            count: related.count,
        },
    }
}

fn condition(field: &str, operator: Operator, values: &[FilterValue]) -> Clause {
    Clause::Condition {
        field: field.to_string(),
        operator,
        values: values.iter().map(FilterValue::to_query_value).collect(),
    }
}

/// Deduplicate include paths, keeping the first appearance of each
pub fn dedup_includes<I, S>(includes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen: Vec<String> = Vec::new();
    for include in includes {
        let include = include.into();
        if !include.is_empty() && !seen.contains(&include) {
            seen.push(include);
        }
    }
    seen
}

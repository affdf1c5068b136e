//! Filter expressions
//!
//! A `Filter` is a composable predicate tree. It is translated into query
//! parameters for the server, and can also be evaluated locally against any
//! [`FieldAccess`] item (used by the aggregate evaluator).

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;

use super::field::FieldAccess;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    Gt(String, FilterValue),
    Lt(String, FilterValue),
    In(String, Vec<FilterValue>),
    NotIn(String, Vec<FilterValue>),
    IsNull(String),
    NotNull(String),
    Between(String, FilterValue, FilterValue),
    DateRange(String, FilterValue, FilterValue),

    // Logical groups; grouping is kept exactly as declared
    And(Vec<Filter>),
    Or(Vec<Filter>),

    Related(RelationshipFilter),
}

/// Condition on a relationship of the queried resource
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipFilter {
    pub relationship: String,
    pub exists: bool,
    pub conditions: Vec<Filter>,
    pub count: Option<CountComparison>,
}

/// Comparison applied to the number of related resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountComparison {
    Eq(u64),
    Gt(u64),
    Lt(u64),
    /// Inclusive range
    Between(u64, u64),
}

impl CountComparison {
    pub fn matches(&self, count: u64) -> bool {
        match *self {
            CountComparison::Eq(n) => count == n,
            CountComparison::Gt(n) => count > n,
            CountComparison::Lt(n) => count < n,
            CountComparison::Between(low, high) => (low..=high).contains(&count),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum FilterValue {
    String(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    #[default]
    Null,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    pub fn is_in<V: Into<FilterValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V: Into<FilterValue>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::NotIn(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull(field.into())
    }

    pub fn not_null(field: impl Into<String>) -> Self {
        Self::NotNull(field.into())
    }

    /// Inclusive numeric range
    pub fn between(field: impl Into<String>, low: impl Into<FilterValue>, high: impl Into<FilterValue>) -> Self {
        Self::Between(field.into(), low.into(), high.into())
    }

    /// Inclusive date range
    pub fn date_range(field: impl Into<String>, from: impl Into<FilterValue>, to: impl Into<FilterValue>) -> Self {
        Self::DateRange(field.into(), from.into(), to.into())
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    /// The resource has at least one related `relationship`
    pub fn has(relationship: impl Into<String>) -> Self {
        Self::Related(RelationshipFilter {
            relationship: relationship.into(),
            exists: true,
            conditions: Vec::new(),
            count: None,
        })
    }

    pub fn doesnt_have(relationship: impl Into<String>) -> Self {
        Self::Related(RelationshipFilter {
            relationship: relationship.into(),
            exists: false,
            conditions: Vec::new(),
            count: None,
        })
    }

    /// At least one related resource satisfies all `conditions`
    ///
    /// Values are forwarded untouched, so wildcard patterns such as `"*@example.com"`
    /// reach the server as written.
    pub fn where_has(relationship: impl Into<String>, conditions: Vec<Filter>) -> Self {
        Self::Related(RelationshipFilter {
            relationship: relationship.into(),
            exists: true,
            conditions,
            count: None,
        })
    }

    pub fn has_count(relationship: impl Into<String>, count: CountComparison) -> Self {
        Self::Related(RelationshipFilter {
            relationship: relationship.into(),
            exists: true,
            conditions: Vec::new(),
            count: Some(count),
        })
    }

    /// Evaluate the filter against a single item
    ///
    /// Missing fields behave like `null`. Wildcards are compared literally, and a
    /// relationship filter with nested conditions never matches locally because
    /// related resources are not available on the item.
    pub fn matches<T: FieldAccess + ?Sized>(&self, item: &T) -> bool {
        match self {
            Filter::Eq(field, FilterValue::Null) | Filter::IsNull(field) => is_null(item.field(field)),
            Filter::NotNull(field) => !is_null(item.field(field)),
            Filter::Eq(field, value) => item.field(field).is_some_and(|v| &v == value),
            Filter::Gt(field, value) => compare_field(item, field, value) == Some(Ordering::Greater),
            Filter::Lt(field, value) => compare_field(item, field, value) == Some(Ordering::Less),
            Filter::In(field, values) => item.field(field).is_some_and(|v| values.contains(&v)),
            Filter::NotIn(field, values) => !item.field(field).is_some_and(|v| values.contains(&v)),
            Filter::Between(field, low, high) | Filter::DateRange(field, low, high) => {
                item.field(field).is_some_and(|v| {
                    matches!(v.compare(low), Some(Ordering::Greater | Ordering::Equal))
                        && matches!(v.compare(high), Some(Ordering::Less | Ordering::Equal))
                })
            }
            Filter::And(filters) => filters.iter().all(|f| f.matches(item)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(item)),
            Filter::Related(related) => {
                if !related.conditions.is_empty() {
                    return false;
                }
                let count = item.related_count(&related.relationship).unwrap_or(0) as u64;
                match related.count {
                    Some(comparison) => comparison.matches(count),
                    None => (count > 0) == related.exists,
                }
            }
        }
    }
}

fn is_null(value: Option<FilterValue>) -> bool {
    matches!(value, None | Some(FilterValue::Null))
}

fn compare_field<T: FieldAccess + ?Sized>(item: &T, field: &str, value: &FilterValue) -> Option<Ordering> {
    item.field(field)?.compare(value)
}

impl FilterValue {
    /// Wire representation used in query parameters
    pub fn to_query_value(&self) -> String {
        match self {
            FilterValue::String(s) => s.clone(),
            FilterValue::Number(n) => n.to_string(),
            FilterValue::Integer(i) => i.to_string(),
            FilterValue::Boolean(b) => b.to_string(),
            FilterValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FilterValue::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
            FilterValue::Null => "null".to_string(),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FilterValue::Null,
            Value::Bool(b) => FilterValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FilterValue::Integer(i),
                None => n.as_f64().map(FilterValue::Number).unwrap_or(FilterValue::Null),
            },
            Value::String(s) => FilterValue::String(s.clone()),
            other => FilterValue::String(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Number(n) => Some(*n),
            FilterValue::Integer(i) => Some(*i as f64),
            FilterValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FilterValue::DateTime(dt) => Some(*dt),
            FilterValue::Date(d) => Some(d.and_time(NaiveTime::MIN).and_utc()),
            FilterValue::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
                }),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, FilterValue::Number(_) | FilterValue::Integer(_))
    }

    fn is_temporal(&self) -> bool {
        matches!(self, FilterValue::Date(_) | FilterValue::DateTime(_))
    }

    /// Order two values; `None` when they are not comparable
    ///
    /// Numbers compare numerically (a numeric string counts when the other side
    /// is a number), dates compare chronologically (ISO strings included),
    /// strings lexically.
    pub fn compare(&self, other: &FilterValue) -> Option<Ordering> {
        match (self, other) {
            (FilterValue::Null, FilterValue::Null) => Some(Ordering::Equal),
            (FilterValue::Null, _) | (_, FilterValue::Null) => None,
            (FilterValue::Boolean(a), FilterValue::Boolean(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() || b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
            (a, b) if a.is_temporal() || b.is_temporal() => Some(a.as_datetime()?.cmp(&b.as_datetime()?)),
            (FilterValue::String(a), FilterValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl PartialEq for FilterValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for FilterValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<&String> for FilterValue {
    fn from(value: &String) -> Self {
        FilterValue::String(value.clone())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<f32> for FilterValue {
    fn from(value: f32) -> Self {
        FilterValue::Number(value as f64)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Integer(value as i64)
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        FilterValue::Integer(value as i64)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(value: NaiveDate) -> Self {
        FilterValue::Date(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        FilterValue::DateTime(value)
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FilterValue::Null)
    }
}

//! Field access without reflection
//!
//! Two ways to reach a value on an item:
//! - by name, through the [`FieldAccess`] registry trait (string-keyed API)
//! - through a typed [`Field`] constant or a closure wrapped with [`by`]
//!
//! Both implement [`Selector`], which is what the aggregate evaluator consumes.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

use super::filters::{Filter, FilterValue};
use super::orderby::OrderBy;
use crate::api::models::Resource;

/// String-keyed field lookup
pub trait FieldAccess {
    fn field(&self, name: &str) -> Option<FilterValue>;

    /// Number of related resources, when the item carries relationship linkage
    fn related_count(&self, _relationship: &str) -> Option<usize> {
        None
    }
}

/// JSON objects: `id` and `type` at top level, other names looked up in
/// `attributes` first and then at top level.
impl FieldAccess for Value {
    fn field(&self, name: &str) -> Option<FilterValue> {
        if name != "id" && name != "type" {
            if let Some(value) = self.get("attributes").and_then(|a| a.get(name)) {
                return Some(FilterValue::from_json(value));
            }
        }
        self.get(name).map(FilterValue::from_json)
    }

    fn related_count(&self, relationship: &str) -> Option<usize> {
        let data = self.get("relationships")?.get(relationship)?.get("data")?;
        Some(linkage_count(data))
    }
}

impl<A: Serialize> FieldAccess for Resource<A> {
    fn field(&self, name: &str) -> Option<FilterValue> {
        match name {
            "id" => Some(FilterValue::String(self.id.clone())),
            "type" => Some(FilterValue::String(self.kind.clone())),
            _ => serde_json::to_value(&self.attributes)
                .ok()?
                .get(name)
                .map(FilterValue::from_json),
        }
    }

    fn related_count(&self, relationship: &str) -> Option<usize> {
        let data = self.relationships.get(relationship)?.get("data")?;
        Some(linkage_count(data))
    }
}

fn linkage_count(data: &Value) -> usize {
    match data {
        Value::Array(items) => items.len(),
        Value::Null => 0,
        _ => 1,
    }
}

/// Typed field of entity `E` with value type `V`
///
/// Carries the wire name (for filters and sorting) and an accessor (for local
/// evaluation), so both sides always refer to the same logical field.
pub struct Field<E, V> {
    name: &'static str,
    get: fn(&E) -> V,
}

impl<E, V> Field<E, V> {
    pub const fn new(name: &'static str, get: fn(&E) -> V) -> Self {
        Self { name, get }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, item: &E) -> V {
        (self.get)(item)
    }

    pub fn asc(&self) -> OrderBy {
        OrderBy::asc(self.name)
    }

    pub fn desc(&self) -> OrderBy {
        OrderBy::desc(self.name)
    }

    pub fn is_null(&self) -> Filter {
        Filter::is_null(self.name)
    }

    pub fn not_null(&self) -> Filter {
        Filter::not_null(self.name)
    }
}

impl<E, V: Into<FilterValue>> Field<E, V> {
    pub fn eq(&self, value: V) -> Filter {
        Filter::eq(self.name, value)
    }

    pub fn gt(&self, value: V) -> Filter {
        Filter::gt(self.name, value)
    }

    pub fn lt(&self, value: V) -> Filter {
        Filter::lt(self.name, value)
    }

    pub fn is_in(&self, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::is_in(self.name, values)
    }

    pub fn not_in(&self, values: impl IntoIterator<Item = V>) -> Filter {
        Filter::not_in(self.name, values)
    }

    pub fn between(&self, low: V, high: V) -> Filter {
        Filter::between(self.name, low, high)
    }
}

impl<E, V> Clone for Field<E, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, V> Copy for Field<E, V> {}

impl<E, V> fmt::Debug for Field<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

impl<E, V> From<Field<E, V>> for String {
    fn from(field: Field<E, V>) -> Self {
        field.name.to_string()
    }
}

/// Picks a value out of an item
pub trait Selector<T> {
    type Output;

    fn select(&self, item: &T) -> Option<Self::Output>;
}

impl<T: FieldAccess> Selector<T> for &str {
    type Output = FilterValue;

    fn select(&self, item: &T) -> Option<FilterValue> {
        item.field(self)
    }
}

impl<T: FieldAccess> Selector<T> for String {
    type Output = FilterValue;

    fn select(&self, item: &T) -> Option<FilterValue> {
        item.field(self)
    }
}

impl<E, V> Selector<E> for Field<E, V> {
    type Output = V;

    fn select(&self, item: &E) -> Option<V> {
        Some((self.get)(item))
    }
}

/// Closure selector, see [`by`]
pub struct By<F, T> {
    select: F,
    _item: PhantomData<fn(&T)>,
}

/// Wrap a closure as a [`Selector`]: `agg.sum(by(|d: &Donation| d.amount))`
pub fn by<T, V, F: Fn(&T) -> V>(select: F) -> By<F, T> {
    By {
        select,
        _item: PhantomData,
    }
}

impl<T, V, F: Fn(&T) -> V> Selector<T> for By<F, T> {
    type Output = V;

    fn select(&self, item: &T) -> Option<V> {
        Some((self.select)(item))
    }
}

/// Row filter used to scope aggregates
pub trait Predicate<T: ?Sized> {
    fn test(&self, item: &T) -> bool;
}

impl<T: ?Sized, F: Fn(&T) -> bool> Predicate<T> for F {
    fn test(&self, item: &T) -> bool {
        self(item)
    }
}

impl<T: FieldAccess + ?Sized> Predicate<T> for Filter {
    fn test(&self, item: &T) -> bool {
        self.matches(item)
    }
}

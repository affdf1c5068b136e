//! Local aggregate evaluation
//!
//! Every aggregate takes a [`Selector`]: a field name (`"amount"`), a typed
//! [`Field`](crate::api::query::Field) or a closure wrapped with
//! [`by`](crate::api::query::by). A name and an accessor for the same logical
//! field give identical results.
//!
//! Empty input is not an error: counts and sums are `0`, `average` is `0.0`,
//! and `min`/`max` return the selected type's `Default` value (`FilterValue::Null`
//! for name-based selectors).

use crate::api::query::field::{Predicate, Selector};
use crate::api::query::filters::FilterValue;

/// Values that can be summed and averaged
pub trait AggregateValue {
    fn to_f64(&self) -> Option<f64>;
}

impl AggregateValue for FilterValue {
    fn to_f64(&self) -> Option<f64> {
        self.as_f64()
    }
}

macro_rules! numeric_aggregate_value {
    ($($ty:ty),*) => {
        $(impl AggregateValue for $ty {
            fn to_f64(&self) -> Option<f64> {
                Some(*self as f64)
            }
        })*
    };
}

numeric_aggregate_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl<V: AggregateValue> AggregateValue for Option<V> {
    fn to_f64(&self) -> Option<f64> {
        self.as_ref().and_then(AggregateValue::to_f64)
    }
}

/// Comparison operator for `having` conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
}

impl Comparison {
    pub fn test(&self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Equal => left == right,
            Comparison::GreaterThan => left > right,
            Comparison::LessThan => left < right,
            Comparison::GreaterOrEqual => left >= right,
            Comparison::LessOrEqual => left <= right,
        }
    }
}

/// Aggregates over a borrowed set of items
#[derive(Debug)]
pub struct Aggregator<'a, T> {
    items: Vec<&'a T>,
}

impl<T> Clone for Aggregator<'_, T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<'a, T> Aggregator<'a, T> {
    pub fn new(items: &'a [T]) -> Self {
        Self {
            items: items.iter().collect(),
        }
    }

    pub fn from_refs(items: Vec<&'a T>) -> Self {
        Self { items }
    }

    /// Restrict to the items matching `predicate`
    pub fn matching<P: Predicate<T>>(&self, predicate: P) -> Self {
        Self {
            items: self.items.iter().copied().filter(|item| predicate.test(item)).collect(),
        }
    }

    pub fn items(&self) -> &[&'a T] {
        &self.items
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Number of distinct selected values; items without a value are skipped
    pub fn count_distinct<S>(&self, selector: S) -> usize
    where
        S: Selector<T>,
        S::Output: PartialEq,
    {
        distinct(self.values(&selector)).len()
    }

    pub fn sum<S>(&self, selector: S) -> f64
    where
        S: Selector<T>,
        S::Output: AggregateValue,
    {
        self.numbers(&selector).iter().sum()
    }

    /// Sum of each distinct value once
    pub fn sum_distinct<S>(&self, selector: S) -> f64
    where
        S: Selector<T>,
        S::Output: AggregateValue + PartialEq,
    {
        distinct(self.values(&selector))
            .iter()
            .filter_map(AggregateValue::to_f64)
            .sum()
    }

    /// Mean of the numeric values; `0.0` when there are none
    pub fn average<S>(&self, selector: S) -> f64
    where
        S: Selector<T>,
        S::Output: AggregateValue,
    {
        mean(&self.numbers(&selector))
    }

    pub fn min<S>(&self, selector: S) -> S::Output
    where
        S: Selector<T>,
        S::Output: PartialOrd + Default,
    {
        self.extreme(&selector, std::cmp::Ordering::Less)
    }

    pub fn max<S>(&self, selector: S) -> S::Output
    where
        S: Selector<T>,
        S::Output: PartialOrd + Default,
    {
        self.extreme(&selector, std::cmp::Ordering::Greater)
    }

    /// Group items by the selected key, in order of first appearance
    pub fn group_by<S>(&self, selector: S) -> Grouped<'a, T, S::Output>
    where
        S: Selector<T>,
        S::Output: PartialEq,
    {
        let mut groups: Vec<Group<'a, T, S::Output>> = Vec::new();
        for &item in &self.items {
            let key = selector.select(item);
            match groups.iter_mut().find(|g| g.key == key) {
                Some(group) => group.items.push(item),
                None => groups.push(Group {
                    key,
                    items: vec![item],
                }),
            }
        }
        Grouped { groups }
    }

    fn values<S: Selector<T>>(&self, selector: &S) -> Vec<S::Output> {
        self.items.iter().filter_map(|&item| selector.select(item)).collect()
    }

    fn numbers<S>(&self, selector: &S) -> Vec<f64>
    where
        S: Selector<T>,
        S::Output: AggregateValue,
    {
        self.values(selector).iter().filter_map(AggregateValue::to_f64).collect()
    }

    fn extreme<S>(&self, selector: &S, wanted: std::cmp::Ordering) -> S::Output
    where
        S: Selector<T>,
        S::Output: PartialOrd + Default,
    {
        let mut best: Option<S::Output> = None;
        for value in self.values(selector) {
            best = match best {
                Some(current) if value.partial_cmp(&current) != Some(wanted) => Some(current),
                _ => Some(value),
            };
        }
        best.unwrap_or_default()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn distinct<V: PartialEq>(values: Vec<V>) -> Vec<V> {
    let mut unique: Vec<V> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}

/// One group of a `group_by`
#[derive(Debug)]
pub struct Group<'a, T, K> {
    /// `None` for items the selector produced no value for
    pub key: Option<K>,
    pub items: Vec<&'a T>,
}

impl<'a, T, K> Group<'a, T, K> {
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn aggregate(&self) -> Aggregator<'a, T> {
        Aggregator::from_refs(self.items.clone())
    }
}

/// Result of `group_by`; `having` filters whole groups
#[derive(Debug)]
pub struct Grouped<'a, T, K> {
    groups: Vec<Group<'a, T, K>>,
}

impl<'a, T, K> Grouped<'a, T, K> {
    /// Keep only the groups satisfying `condition`; a rejected group drops all
    /// of its members
    pub fn having<F>(self, condition: F) -> Self
    where
        F: Fn(&Group<'a, T, K>) -> bool,
    {
        Self {
            groups: self.groups.into_iter().filter(|g| condition(g)).collect(),
        }
    }

    /// `having` on the member count: `having_count(Comparison::GreaterThan, 1)`
    pub fn having_count(self, comparison: Comparison, threshold: usize) -> Self {
        self.having(|group| comparison.test(group.count() as f64, threshold as f64))
    }

    /// `having` on a per-group sum
    pub fn having_sum<S>(self, selector: S, comparison: Comparison, threshold: f64) -> Self
    where
        S: Selector<T>,
        S::Output: AggregateValue,
    {
        self.having(|group| {
            let sum: f64 = group.aggregate().numbers(&selector).iter().sum();
            comparison.test(sum, threshold)
        })
    }

    /// `having` on a per-group average
    pub fn having_average<S>(self, selector: S, comparison: Comparison, threshold: f64) -> Self
    where
        S: Selector<T>,
        S::Output: AggregateValue,
    {
        self.having(|group| comparison.test(mean(&group.aggregate().numbers(&selector)), threshold))
    }

    pub fn groups(&self) -> &[Group<'a, T, K>] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<Group<'a, T, K>> {
        self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = Option<&K>> {
        self.groups.iter().map(|g| g.key.as_ref())
    }
}

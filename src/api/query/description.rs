//! Structured query description and its wire encoding
//!
//! Encoding rules:
//! - conditions: `where[f]=v`, `where[f][gt]=v`, `where[f][lt]=v`,
//!   `where[f][in][]=v` (repeated), `where[f][not_in][]=v`,
//!   `where[f][null]=true`, `where[f][not_null]=true`,
//!   `where[f][between][]=lo&where[f][between][]=hi`, same for `date_range`.
//!   An empty list is sent as `where[f][in]=`. When list conditions with the
//!   same field and operator follow each other, the second and later ones carry
//!   an ordinal: `where[f][in][1][]=v`.
//! - groups: `where[or][k][i]...` / `where[and][k][i]...`, `k` numbering the
//!   groups of one level and `i` the child inside the group. A group without
//!   children is sent as `where[or][k]=`.
//! - relationships: `where[has][rel]=true|false`, `where[has][rel][count]=n`,
//!   `...[count][gt]=n`, `...[count][lt]=n`, `...[count][between][]=n`, nested
//!   conditions under `where[has][rel][where]...`.
//! - `include=a,b`, `order=a,b desc`, `per_page`, `offset`, `cursor`, then any
//!   extra named parameters.
//!
//! Key segments and values are percent-encoded one by one, brackets included,
//! so field names stay opaque.
//! `or`, `and` and `has` are reserved and cannot be used as field names.

use crate::api::constants::params;
use crate::api::error::ApiError;

use super::filters::CountComparison;
use super::orderby::OrderBy;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescription {
    pub clauses: Vec<Clause>,
    pub includes: Vec<String>,
    pub order: Vec<OrderBy>,
    pub paging: Option<Paging>,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Condition {
        field: String,
        operator: Operator,
        values: Vec<String>,
    },
    Group {
        logic: Logic,
        clauses: Vec<Clause>,
    },
    Relationship {
        relationship: String,
        exists: bool,
        conditions: Vec<Clause>,
        count: Option<CountComparison>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    In,
    NotIn,
    Null,
    NotNull,
    Between,
    DateRange,
    Gt,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paging {
    Offset { per_page: Option<u32>, offset: Option<u32> },
    Cursor { per_page: Option<u32>, cursor: String },
}

impl Paging {
    pub fn per_page(&self) -> Option<u32> {
        match self {
            Paging::Offset { per_page, .. } | Paging::Cursor { per_page, .. } => *per_page,
        }
    }
}

const HAS: &str = "has";
const NESTED_WHERE: &str = "where";

impl Operator {
    fn name(&self) -> Option<&'static str> {
        match self {
            Operator::Eq => None,
            Operator::Gt => Some("gt"),
            Operator::Lt => Some("lt"),
            Operator::In => Some("in"),
            Operator::NotIn => Some("not_in"),
            Operator::Null => Some("null"),
            Operator::NotNull => Some("not_null"),
            Operator::Between => Some("between"),
            Operator::DateRange => Some("date_range"),
        }
    }

    fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::Between | Operator::DateRange)
    }

    /// Operator and list ordinal from the segments after the field name
    fn from_segments(segments: &[String]) -> Option<(Self, u32)> {
        let Some((name, tail)) = segments.split_first() else {
            return Some((Operator::Eq, 0));
        };
        let operator = match name.as_str() {
            "gt" => Operator::Gt,
            "lt" => Operator::Lt,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "null" => Operator::Null,
            "not_null" => Operator::NotNull,
            "between" => Operator::Between,
            "date_range" => Operator::DateRange,
            _ => return None,
        };
        if !operator.is_list() {
            return tail.is_empty().then_some((operator, 0));
        }

        let (ordinal, tail) = match tail.split_first() {
            Some((ordinal, rest)) if !ordinal.is_empty() => (ordinal.parse().ok()?, rest),
            _ => (0, tail),
        };
        match tail {
            [] => Some((operator, ordinal)),
            [end] if end.is_empty() => Some((operator, ordinal)),
            _ => None,
        }
    }
}

impl Logic {
    fn as_str(&self) -> &'static str {
        match self {
            Logic::And => "and",
            Logic::Or => "or",
        }
    }
}

impl QueryDescription {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
            && self.includes.is_empty()
            && self.order.is_empty()
            && self.paging.is_none()
            && self.params.is_empty()
    }

    /// Fails with `InvalidQuery` on groups without children
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_clauses(&self.clauses)
    }

    /// Raw (unencoded) key/value pairs in wire order
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .where_pairs()
            .into_iter()
            .map(|(segments, value)| (join_key(&segments), value))
            .collect();
        pairs.extend(self.option_pairs());
        pairs
    }

    /// Percent-encoded query string, without the leading `?`
    pub fn to_query_string(&self) -> String {
        let conditions = self
            .where_pairs()
            .into_iter()
            .map(|(segments, value)| format!("{}={}", encode_segments(&segments), urlencoding::encode(&value)));
        let options = self
            .option_pairs()
            .into_iter()
            .map(|(key, value)| format!("{}={}", encode_key(&key), encode_list_value(&key, &value)));
        conditions.chain(options).collect::<Vec<_>>().join("&")
    }

    fn where_pairs(&self) -> Vec<WirePair> {
        let mut pairs = Vec::new();
        encode_clauses(&self.clauses, &[params::WHERE.to_string()], &mut pairs);
        pairs
    }

    fn option_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if !self.includes.is_empty() {
            pairs.push((params::INCLUDE.to_string(), self.includes.join(",")));
        }
        if !self.order.is_empty() {
            let order: Vec<String> = self.order.iter().map(OrderBy::to_query_string).collect();
            pairs.push((params::ORDER.to_string(), order.join(",")));
        }
        match &self.paging {
            Some(Paging::Offset { per_page, offset }) => {
                if let Some(per_page) = per_page {
                    pairs.push((params::PER_PAGE.to_string(), per_page.to_string()));
                }
                if let Some(offset) = offset {
                    pairs.push((params::OFFSET.to_string(), offset.to_string()));
                }
            }
            Some(Paging::Cursor { per_page, cursor }) => {
                if let Some(per_page) = per_page {
                    pairs.push((params::PER_PAGE.to_string(), per_page.to_string()));
                }
                pairs.push((params::CURSOR.to_string(), cursor.clone()));
            }
            None => {}
        }
        pairs.extend(self.params.iter().cloned());
        pairs
    }

    /// Parse a query string produced by [`to_query_string`](Self::to_query_string)
    pub fn from_query_string(query: &str) -> Result<Self, ApiError> {
        let mut description = QueryDescription::default();
        let mut where_entries = Vec::new();
        let mut per_page = None;
        let mut offset = None;
        let mut cursor = None;

        for pair in query.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            if let Some(segments) = where_segments(raw_key)? {
                where_entries.push(Entry {
                    segments,
                    value: decode(raw_value)?,
                });
                continue;
            }

            let key = decode(raw_key)?;
            let value = raw_value.to_string();

            match key.as_str() {
                params::INCLUDE => {
                    for include in value.split(',').filter(|i| !i.is_empty()) {
                        description.includes.push(decode(include)?);
                    }
                }
                params::ORDER => {
                    for key in value.split(',') {
                        let key = decode(key)?;
                        let order = OrderBy::parse(&key)
                            .ok_or_else(|| ApiError::InvalidQuery(format!("empty sort key in '{}'", value)))?;
                        description.order.push(order);
                    }
                }
                params::PER_PAGE => per_page = Some(parse_number(params::PER_PAGE, &decode(&value)?)?),
                params::OFFSET => offset = Some(parse_number(params::OFFSET, &decode(&value)?)?),
                params::CURSOR => cursor = Some(decode(&value)?),
                _ => description.params.push((key, decode(&value)?)),
            }
        }

        description.clauses = parse_clauses(where_entries)?;
        description.paging = match (cursor, per_page, offset) {
            (Some(cursor), per_page, _) => Some(Paging::Cursor { per_page, cursor }),
            (None, None, None) => None,
            (None, per_page, offset) => Some(Paging::Offset { per_page, offset }),
        };
        Ok(description)
    }
}

/// Key segments (`["where", "a", "in", ""]`) and the raw value
type WirePair = (Vec<String>, String);

fn encode_clauses(clauses: &[Clause], prefix: &[String], pairs: &mut Vec<WirePair>) {
    let mut group_index = 0;
    // list condition written last at this level, with its ordinal
    let mut last_list: Option<(&str, Operator, u32)> = None;

    for clause in clauses {
        let written = pairs.len();
        let mut list = None;

        match clause {
            Clause::Condition { field, operator, values } => {
                let mut segments = prefix.to_vec();
                segments.push(field.clone());
                segments.extend(operator.name().map(str::to_string));

                if operator.is_list() {
                    let ordinal = match last_list {
                        Some((last_field, last_operator, n)) if last_field == field.as_str() && last_operator == *operator => n + 1,
                        _ => 0,
                    };
                    if ordinal > 0 {
                        segments.push(ordinal.to_string());
                    }
                    if values.is_empty() {
                        pairs.push((segments, String::new()));
                    } else {
                        segments.push(String::new());
                        for value in values {
                            pairs.push((segments.clone(), value.clone()));
                        }
                    }
                    list = Some((field.as_str(), *operator, ordinal));
                } else if matches!(operator, Operator::Null | Operator::NotNull) {
                    pairs.push((segments, "true".to_string()));
                } else if let Some(value) = values.first() {
                    pairs.push((segments, value.clone()));
                }
            }
            Clause::Group { logic, clauses } if clauses.is_empty() => {
                let mut segments = prefix.to_vec();
                segments.push(logic.as_str().to_string());
                segments.push(group_index.to_string());
                pairs.push((segments, String::new()));
                group_index += 1;
            }
            Clause::Group { logic, clauses } => {
                for (child_index, child) in clauses.iter().enumerate() {
                    let mut segments = prefix.to_vec();
                    segments.push(logic.as_str().to_string());
                    segments.push(group_index.to_string());
                    segments.push(child_index.to_string());
                    encode_clauses(std::slice::from_ref(child), &segments, pairs);
                }
                group_index += 1;
            }
            Clause::Relationship { relationship, exists, conditions, count } => {
                let mut segments = prefix.to_vec();
                segments.push(HAS.to_string());
                segments.push(relationship.clone());
                pairs.push((segments.clone(), exists.to_string()));

                if let Some(count) = count {
                    let mut count_segments = segments.clone();
                    count_segments.push("count".to_string());
                    match count {
                        CountComparison::Eq(n) => pairs.push((count_segments, n.to_string())),
                        CountComparison::Gt(n) => {
                            count_segments.push("gt".to_string());
                            pairs.push((count_segments, n.to_string()));
                        }
                        CountComparison::Lt(n) => {
                            count_segments.push("lt".to_string());
                            pairs.push((count_segments, n.to_string()));
                        }
                        CountComparison::Between(low, high) => {
                            count_segments.push("between".to_string());
                            count_segments.push(String::new());
                            pairs.push((count_segments.clone(), low.to_string()));
                            pairs.push((count_segments, high.to_string()));
                        }
                    }
                }

                if !conditions.is_empty() {
                    segments.push(NESTED_WHERE.to_string());
                    encode_clauses(conditions, &segments, pairs);
                }
            }
        }

        if pairs.len() > written {
            last_list = list;
        }
    }
}

fn validate_clauses(clauses: &[Clause]) -> Result<(), ApiError> {
    for clause in clauses {
        match clause {
            Clause::Group { logic, clauses } if clauses.is_empty() => {
                return Err(ApiError::InvalidQuery(format!(
                    "{} group has no conditions",
                    logic.as_str()
                )));
            }
            Clause::Group { clauses, .. } => validate_clauses(clauses)?,
            Clause::Relationship { conditions, .. } => validate_clauses(conditions)?,
            Clause::Condition { .. } => {}
        }
    }
    Ok(())
}

/// `["where", "a", "in", ""]` -> `where[a][in][]`
fn join_key(segments: &[String]) -> String {
    let mut key = segments[0].clone();
    for segment in &segments[1..] {
        key.push('[');
        key.push_str(segment);
        key.push(']');
    }
    key
}

/// `["where", "a]b", "in", ""]` -> `where[a%5Db][in][]`
fn encode_segments(segments: &[String]) -> String {
    let mut key = urlencoding::encode(&segments[0]).into_owned();
    for segment in &segments[1..] {
        key.push('[');
        key.push_str(&urlencoding::encode(segment));
        key.push(']');
    }
    key
}

/// Extra parameters keep their brackets literal, e.g. `fields[Person]`
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    let mut segment = String::new();
    for c in key.chars() {
        if c == '[' || c == ']' {
            encoded.push_str(&urlencoding::encode(&segment));
            segment.clear();
            encoded.push(c);
        } else {
            segment.push(c);
        }
    }
    encoded.push_str(&urlencoding::encode(&segment));
    encoded
}

/// `include` and `order` keep their commas as separators
fn encode_list_value(key: &str, value: &str) -> String {
    if key == params::INCLUDE || key == params::ORDER {
        value
            .split(',')
            .map(|v| urlencoding::encode(v).into_owned())
            .collect::<Vec<_>>()
            .join(",")
    } else {
        urlencoding::encode(value).into_owned()
    }
}

fn decode(value: &str) -> Result<String, ApiError> {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .map_err(|e| ApiError::InvalidQuery(format!("invalid percent-encoding in '{}': {}", value, e)))
}

fn parse_number(name: &str, value: &str) -> Result<u32, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::InvalidQuery(format!("{} must be a non-negative integer, got '{}'", name, value)))
}

/// Decoded segments of a `where` key, split before decoding so encoded
/// brackets inside a field name stay part of it. Keys whose brackets were
/// themselves encoded are split after decoding.
fn where_segments(raw_key: &str) -> Result<Option<Vec<String>>, ApiError> {
    if let Some(segments) = split_key(raw_key, params::WHERE) {
        return segments.iter().map(|s| decode(s)).collect::<Result<Vec<_>, _>>().map(Some);
    }
    Ok(split_key(&decode(raw_key)?, params::WHERE))
}

/// `where[a][b][]` -> `["a", "b", ""]`; `None` when the key has another base
fn split_key(key: &str, base: &str) -> Option<Vec<String>> {
    let mut rest = key.strip_prefix(base)?;
    let mut segments = Vec::new();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('[')?;
        let end = inner.find(']')?;
        segments.push(inner[..end].to_string());
        rest = &inner[end + 1..];
    }
    (!segments.is_empty()).then_some(segments)
}

#[derive(Debug, Clone)]
struct Entry {
    segments: Vec<String>,
    value: String,
}

#[derive(Debug, PartialEq)]
enum UnitKey {
    Condition(String, Operator, u32),
    Group(Logic, String),
    Relationship(String),
}

struct Unit {
    key: UnitKey,
    entries: Vec<Entry>,
}

fn unit_key(entry: &Entry) -> Result<(UnitKey, Vec<String>), ApiError> {
    let invalid = || ApiError::InvalidQuery(format!("unrecognised filter key segments {:?}", entry.segments));
    let (head, rest) = entry.segments.split_first().ok_or_else(invalid)?;

    match head.as_str() {
        "or" | "and" => {
            let logic = if head == "or" { Logic::Or } else { Logic::And };
            let (group, rest) = rest.split_first().ok_or_else(invalid)?;
            Ok((UnitKey::Group(logic, group.clone()), rest.to_vec()))
        }
        HAS => {
            let (relationship, rest) = rest.split_first().ok_or_else(invalid)?;
            Ok((UnitKey::Relationship(relationship.clone()), rest.to_vec()))
        }
        field => {
            let (operator, ordinal) = Operator::from_segments(rest).ok_or_else(invalid)?;
            Ok((UnitKey::Condition(field.to_string(), operator, ordinal), rest.to_vec()))
        }
    }
}

fn parse_clauses(entries: Vec<Entry>) -> Result<Vec<Clause>, ApiError> {
    let mut units: Vec<Unit> = Vec::new();

    for entry in entries {
        let (key, rest) = unit_key(&entry)?;
        let entry = Entry {
            segments: rest,
            value: entry.value,
        };

        let mergeable = match &key {
            UnitKey::Group(..) => units.iter().position(|u| u.key == key),
            UnitKey::Condition(_, operator, _) if operator.is_list() => {
                units.last().filter(|u| u.key == key).map(|_| units.len() - 1)
            }
            UnitKey::Relationship(_) if !entry.segments.is_empty() => {
                units.last().filter(|u| u.key == key).map(|_| units.len() - 1)
            }
            _ => None,
        };

        match mergeable {
            Some(index) => units[index].entries.push(entry),
            None => units.push(Unit { key, entries: vec![entry] }),
        }
    }

    units.into_iter().map(unit_to_clause).collect()
}

fn unit_to_clause(unit: Unit) -> Result<Clause, ApiError> {
    match unit.key {
        UnitKey::Condition(field, operator, _) => {
            let values = match operator {
                Operator::Null | Operator::NotNull => Vec::new(),
                // list values end in `[]`; the bare key only marks an empty list
                _ if operator.is_list() => unit
                    .entries
                    .into_iter()
                    .filter(|e| e.segments.last().is_some_and(String::is_empty))
                    .map(|e| e.value)
                    .collect(),
                _ => unit.entries.into_iter().map(|e| e.value).collect(),
            };
            Ok(Clause::Condition { field, operator, values })
        }
        UnitKey::Group(logic, _) => {
            let mut children: Vec<(String, Vec<Entry>)> = Vec::new();
            for entry in unit.entries {
                // `where[or][k]=` marks a group without children
                let Some((index, rest)) = entry.segments.split_first() else {
                    continue;
                };
                let child = Entry {
                    segments: rest.to_vec(),
                    value: entry.value.clone(),
                };
                match children.iter_mut().find(|(i, _)| i == index) {
                    Some((_, entries)) => entries.push(child),
                    None => children.push((index.clone(), vec![child])),
                }
            }

            let mut clauses = Vec::new();
            for (_, entries) in children {
                clauses.extend(parse_clauses(entries)?);
            }
            Ok(Clause::Group { logic, clauses })
        }
        UnitKey::Relationship(relationship) => {
            let mut exists = true;
            let mut count = None;
            let mut between = Vec::new();
            let mut nested = Vec::new();

            for entry in unit.entries {
                let segments: Vec<&str> = entry.segments.iter().map(String::as_str).collect();
                match segments.as_slice() {
                    [] => exists = parse_flag(&entry.value)?,
                    ["count"] => count = Some(CountComparison::Eq(parse_count(&entry.value)?)),
                    ["count", "gt"] => count = Some(CountComparison::Gt(parse_count(&entry.value)?)),
                    ["count", "lt"] => count = Some(CountComparison::Lt(parse_count(&entry.value)?)),
                    ["count", "between", ""] => between.push(parse_count(&entry.value)?),
                    [NESTED_WHERE, ..] => nested.push(Entry {
                        segments: entry.segments[1..].to_vec(),
                        value: entry.value,
                    }),
                    _ => {
                        return Err(ApiError::InvalidQuery(format!(
                            "unrecognised relationship filter on '{}': {:?}",
                            relationship, entry.segments
                        )));
                    }
                }
            }

            if !between.is_empty() {
                let &[low, high] = between.as_slice() else {
                    return Err(ApiError::InvalidQuery(format!(
                        "count range on '{}' needs exactly two bounds",
                        relationship
                    )));
                };
                count = Some(CountComparison::Between(low, high));
            }

            Ok(Clause::Relationship {
                relationship,
                exists,
                conditions: parse_clauses(nested)?,
                count,
            })
        }
    }
}

fn parse_flag(value: &str) -> Result<bool, ApiError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ApiError::InvalidQuery(format!("expected true or false, got '{}'", other))),
    }
}

fn parse_count(value: &str) -> Result<u64, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::InvalidQuery(format!("relationship count must be an integer, got '{}'", value)))
}

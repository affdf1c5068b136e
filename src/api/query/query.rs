//! Reusable Query object
//!
//! Represents a complete list query that can be executed multiple times

use super::description::{Paging, QueryDescription};
use super::filters::Filter;
use super::orderby::OrderByClause;
use super::translate;

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub endpoint: String,
    pub filters: Vec<Filter>,
    pub includes: Vec<String>,
    pub orderby: OrderByClause,
    pub paging: Option<Paging>,
    pub params: Vec<(String, String)>,
}

impl Query {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Clone and modify - useful for creating variations of base queries
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }

    /// Translate into the structured description the encoder consumes
    pub fn describe(&self) -> QueryDescription {
        QueryDescription {
            clauses: translate::translate_filters(&self.filters),
            includes: translate::dedup_includes(self.includes.iter().cloned()),
            order: self.orderby.iter().cloned().collect(),
            paging: self.paging.clone(),
            params: self.params.clone(),
        }
    }

    /// Endpoint plus encoded query string
    pub fn to_path(&self) -> String {
        with_query(&self.endpoint, &self.describe().to_query_string())
    }
}

/// Append an encoded query string to a path that may already carry one
pub fn with_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else if path.contains('?') {
        format!("{}&{}", path, query)
    } else {
        format!("{}?{}", path, query)
    }
}

//! QueryBuilder for fluent query construction
//!
//! Provides a fluent API that builds Query objects for execution, plus remote
//! aggregates that run over every page of the result set.

use serde::de::DeserializeOwned;

use super::description::Paging;
use super::field::Selector;
use super::filters::Filter;
use super::orderby::OrderBy;
use super::query::Query;
use super::result::PagedResult;
use crate::api::aggregate::{AggregateValue, Aggregator};
use crate::api::client::PlanningCenterClient;
use crate::api::error::{ApiError, Result};

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            query: Query::new(endpoint),
        }
    }

    /// Add a filter; repeated calls are combined with AND
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filters.push(filter);
        self
    }

    /// Include a relationship; dotted paths request nested includes
    pub fn include(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !path.is_empty() && !self.query.includes.contains(&path) {
            self.query.includes.push(path);
        }
        self
    }

    pub fn includes(self, paths: &[&str]) -> Self {
        paths.iter().fold(self, |builder, path| builder.include(*path))
    }

    /// Add a sort key; the first call is the primary sort
    pub fn orderby(mut self, order: OrderBy) -> Self {
        self.query.orderby.push(order);
        self
    }

    pub fn orderby_multiple(self, orders: Vec<OrderBy>) -> Self {
        orders.into_iter().fold(self, |builder, order| builder.orderby(order))
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.query.paging = Some(match self.query.paging.take() {
            Some(Paging::Cursor { cursor, .. }) => Paging::Cursor {
                per_page: Some(per_page),
                cursor,
            },
            Some(Paging::Offset { offset, .. }) => Paging::Offset {
                per_page: Some(per_page),
                offset,
            },
            None => Paging::Offset {
                per_page: Some(per_page),
                offset: None,
            },
        });
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        let per_page = self.query.paging.as_ref().and_then(Paging::per_page);
        self.query.paging = Some(Paging::Offset {
            per_page,
            offset: Some(offset),
        });
        self
    }

    /// 1-based page of `size` items: `offset = (page - 1) * size`
    pub fn page(self, page: u32, size: u32) -> Result<Self> {
        if page < 1 {
            return Err(ApiError::Configuration(format!("page number must be at least 1, got {}", page)));
        }
        if size < 1 {
            return Err(ApiError::Configuration(format!("page size must be at least 1, got {}", size)));
        }
        let offset = (page - 1)
            .checked_mul(size)
            .ok_or_else(|| ApiError::Configuration(format!("page {} of size {} is out of range", page, size)))?;
        Ok(self.per_page(size).offset(offset))
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        let per_page = self.query.paging.as_ref().and_then(Paging::per_page);
        self.query.paging = Some(Paging::Cursor {
            per_page,
            cursor: cursor.into(),
        });
        self
    }

    /// Extra named query parameter, sent verbatim
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.params.push((key.into(), value.into()));
        self
    }

    /// Build the final Query object (reusable)
    pub fn build(self) -> Query {
        self.query
    }

    /// Build and fetch the first page
    pub async fn execute<T>(self, client: &PlanningCenterClient) -> Result<PagedResult<T>>
    where
        T: DeserializeOwned + Send,
    {
        let query = self.build();
        client.get_paged(&query.endpoint, &query.describe()).await
    }

    pub async fn first<T>(self, client: &PlanningCenterClient) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let page = self.per_page(1).execute::<T>(client).await?;
        Ok(page.into_items().into_iter().next())
    }

    /// Every item across all pages, in page order
    pub async fn all<T>(self, client: &PlanningCenterClient) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.execute::<T>(client).await?.get_all_remaining().await
    }
}

// Remote aggregates
impl QueryBuilder {
    /// Number of matching resources
    ///
    /// Uses the server's `meta.total_count` from a one-item page; when the
    /// server does not report it, every page is fetched and counted.
    pub async fn count(self, client: &PlanningCenterClient) -> Result<u64> {
        let all_pages = self.clone();
        let page = self.per_page(1).execute::<serde_json::Value>(client).await?;
        if let Some(total) = page.total_count() {
            return Ok(total);
        }
        let items = all_pages.all::<serde_json::Value>(client).await?;
        Ok(items.len() as u64)
    }

    /// Fetch every page, then evaluate `f` over all items
    pub async fn aggregate<T, R, F>(self, client: &PlanningCenterClient, f: F) -> Result<R>
    where
        T: DeserializeOwned + Send,
        F: FnOnce(Aggregator<'_, T>) -> R,
    {
        let items = self.all::<T>(client).await?;
        Ok(f(Aggregator::new(&items)))
    }

    pub async fn sum<T, S>(self, client: &PlanningCenterClient, selector: S) -> Result<f64>
    where
        T: DeserializeOwned + Send,
        S: Selector<T>,
        S::Output: AggregateValue,
    {
        self.aggregate(client, |agg: Aggregator<'_, T>| agg.sum(selector)).await
    }

    pub async fn sum_distinct<T, S>(self, client: &PlanningCenterClient, selector: S) -> Result<f64>
    where
        T: DeserializeOwned + Send,
        S: Selector<T>,
        S::Output: AggregateValue + PartialEq,
    {
        self.aggregate(client, |agg: Aggregator<'_, T>| agg.sum_distinct(selector)).await
    }

    pub async fn average<T, S>(self, client: &PlanningCenterClient, selector: S) -> Result<f64>
    where
        T: DeserializeOwned + Send,
        S: Selector<T>,
        S::Output: AggregateValue,
    {
        self.aggregate(client, |agg: Aggregator<'_, T>| agg.average(selector)).await
    }

    pub async fn min<T, S>(self, client: &PlanningCenterClient, selector: S) -> Result<S::Output>
    where
        T: DeserializeOwned + Send,
        S: Selector<T>,
        S::Output: PartialOrd + Default,
    {
        self.aggregate(client, |agg: Aggregator<'_, T>| agg.min(selector)).await
    }

    pub async fn max<T, S>(self, client: &PlanningCenterClient, selector: S) -> Result<S::Output>
    where
        T: DeserializeOwned + Send,
        S: Selector<T>,
        S::Output: PartialOrd + Default,
    {
        self.aggregate(client, |agg: Aggregator<'_, T>| agg.max(selector)).await
    }

    pub async fn count_distinct<T, S>(self, client: &PlanningCenterClient, selector: S) -> Result<usize>
    where
        T: DeserializeOwned + Send,
        S: Selector<T>,
        S::Output: PartialEq,
    {
        self.aggregate(client, |agg: Aggregator<'_, T>| agg.count_distinct(selector)).await
    }
}

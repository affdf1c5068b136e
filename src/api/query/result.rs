//! Paged list results
//!
//! A [`PagedResult`] holds exactly one page plus the navigation state needed to
//! fetch its neighbours. [`Pages`] walks the remaining pages lazily, in order,
//! one fetch at a time.

use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tokio_util::sync::CancellationToken;

use super::description::QueryDescription;
use crate::api::aggregate::Aggregator;
use crate::api::client::PlanningCenterClient;
use crate::api::error::{ApiError, Result};
use crate::api::models::{PageLinks, PageMeta, ResponseMapper};

#[derive(Debug, Clone)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub meta: Option<PageMeta>,
    pub links: Option<PageLinks>,
    /// Side-loaded resources from `include`
    pub included: Vec<Value>,
    endpoint: String,
    description: QueryDescription,
    client: Option<PlanningCenterClient>,
}

impl<T> PagedResult<T> {
    /// A page with no connection back to the server
    pub fn detached(items: Vec<T>) -> Self {
        Self {
            items,
            meta: None,
            links: None,
            included: Vec::new(),
            endpoint: String::new(),
            description: QueryDescription::default(),
            client: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn description(&self) -> &QueryDescription {
        &self.description
    }

    pub fn next_link(&self) -> Option<&str> {
        self.links.as_ref().and_then(|l| l.next.as_deref()).filter(|l| !l.is_empty())
    }

    pub fn previous_link(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|l| l.previous.as_deref())
            .filter(|l| !l.is_empty())
    }

    pub fn has_next(&self) -> bool {
        self.next_link().is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous_link().is_some()
    }

    /// Server-reported size of the whole result set
    pub fn total_count(&self) -> Option<u64> {
        self.meta.as_ref().and_then(|m| m.total_count)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Aggregate over this page only
    pub fn aggregate(&self) -> Aggregator<'_, T> {
        Aggregator::new(&self.items)
    }

    /// Convert every item with a resource mapper, keeping the navigation state
    pub fn map_items<M>(self, mapper: &M) -> Result<PagedResult<M::Model>>
    where
        M: ResponseMapper<Dto = T>,
    {
        let items = self
            .items
            .into_iter()
            .map(|item| mapper.to_model(item))
            .collect::<Result<Vec<_>>>()?;

        Ok(PagedResult {
            items,
            meta: self.meta,
            links: self.links,
            included: self.included,
            endpoint: self.endpoint,
            description: self.description,
            client: self.client,
        })
    }
}

impl<T: DeserializeOwned> PagedResult<T> {
    /// Parse a `data`/`meta`/`links` list envelope
    ///
    /// An empty `data` array is a valid empty page; a missing `data` member is
    /// an error.
    pub fn from_json(
        json: Value,
        endpoint: impl Into<String>,
        description: QueryDescription,
        client: Option<PlanningCenterClient>,
    ) -> Result<Self> {
        let Value::Object(mut envelope) = json else {
            return Err(ApiError::malformed(None, "list response is not a JSON object", None));
        };

        let items = match envelope.remove("data") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<std::result::Result<Vec<T>, _>>(),
            Some(Value::Null) | None => {
                return Err(ApiError::malformed(None, "list response has no data member", None));
            }
            Some(single) => serde_json::from_value(single).map(|item| vec![item]),
        }
        .map_err(|e| ApiError::malformed(None, e, None))?;

        let meta = envelope
            .remove("meta")
            .filter(|m| !m.is_null())
            .map(serde_json::from_value::<PageMeta>)
            .transpose()
            .map_err(|e| ApiError::malformed(None, e, None))?;

        let links = envelope
            .remove("links")
            .filter(|l| !l.is_null())
            .map(serde_json::from_value::<PageLinks>)
            .transpose()
            .map_err(|e| ApiError::malformed(None, e, None))?;

        let included = match envelope.remove("included") {
            Some(Value::Array(included)) => included,
            _ => Vec::new(),
        };

        Ok(Self {
            items,
            meta,
            links,
            included,
            endpoint: endpoint.into(),
            description,
            client,
        })
    }
}

impl<T: DeserializeOwned + Send> PagedResult<T> {
    fn connection(&self, link: Option<&str>, direction: &str) -> Result<(&PlanningCenterClient, String)> {
        let link = link.ok_or_else(|| ApiError::InvalidOperation(format!("there is no {} page", direction)))?;
        let client = self.client.as_ref().ok_or_else(|| {
            ApiError::InvalidOperation(format!("cannot fetch the {} page of a detached result", direction))
        })?;
        Ok((client, link.to_string()))
    }

    pub async fn next_page(&self) -> Result<PagedResult<T>> {
        let (client, link) = self.connection(self.next_link(), "next")?;
        client.fetch_page(&link, &self.endpoint, &self.description).await
    }

    pub async fn previous_page(&self) -> Result<PagedResult<T>> {
        let (client, link) = self.connection(self.previous_link(), "previous")?;
        client.fetch_page(&link, &self.endpoint, &self.description).await
    }

    /// `Ok(None)` when there is no next link or no connection; fetch errors propagate
    pub async fn next_page_or_none(&self) -> Result<Option<PagedResult<T>>> {
        if !self.has_next() || self.client.is_none() {
            return Ok(None);
        }
        self.next_page().await.map(Some)
    }

    /// This page's items followed by every later page's, in page order
    pub async fn get_all_remaining(self) -> Result<Vec<T>> {
        let mut pages = self.into_pages();
        let mut items = Vec::new();
        while let Some(item) = pages.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Lazy cursor over this page and all later ones
    pub fn into_pages(self) -> Pages<T> {
        let next_link = self.next_link().map(str::to_string);
        Pages {
            buffer: self.items.into(),
            next_link,
            endpoint: self.endpoint,
            description: self.description,
            client: self.client,
            cancel: None,
            visited: HashSet::new(),
        }
    }

    /// Lazy stream of items; ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        futures::stream::unfold(Some(self.into_pages()), |state| async move {
            let mut pages = state?;
            match pages.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(pages))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Lazy, resumable walk over the remaining items of a paged result
///
/// Items already buffered are always handed out before the next page is
/// requested. A failed or cancelled fetch leaves the cursor untouched, so
/// calling [`next`](Pages::next) again retries the same page. A `next` link
/// pointing back at an already fetched page is an `InvalidOperation`.
#[derive(Debug)]
pub struct Pages<T> {
    buffer: VecDeque<T>,
    next_link: Option<String>,
    endpoint: String,
    description: QueryDescription,
    client: Option<PlanningCenterClient>,
    cancel: Option<CancellationToken>,
    visited: HashSet<String>,
}

impl<T: DeserializeOwned + Send> Pages<T> {
    /// Cancellation checked before and during each page fetch
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.set_cancellation(token);
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.next_link.is_none()
    }

    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            let Some(link) = self.next_link.clone() else {
                return Ok(None);
            };

            let client = self.client.as_ref().ok_or_else(|| {
                ApiError::InvalidOperation("cannot fetch the next page of a detached result".to_string())
            })?;
            let client = match &self.cancel {
                Some(token) if token.is_cancelled() => return Err(ApiError::Cancelled),
                Some(token) => client.with_cancellation(token.clone()),
                None => client.clone(),
            };

            let page: PagedResult<T> = client.fetch_page(&link, &self.endpoint, &self.description).await?;
            let next_link = page.next_link().map(str::to_string);
            if let Some(next) = next_link.as_ref().filter(|next| **next == link || self.visited.contains(*next)) {
                return Err(ApiError::InvalidOperation(format!(
                    "page {} links back to an already fetched page {}",
                    link, next
                )));
            }
            self.visited.insert(link);
            self.next_link = next_link;
            self.buffer.extend(page.items);
        }
    }
}

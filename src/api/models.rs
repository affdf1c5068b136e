//! Wire models
//!
//! OAuth token cache entries, the JSON:API resource envelope, request bodies,
//! paging metadata and the mapper traits resources plug into.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

use super::error::ApiError;

/// Cached OAuth token; lives only in process memory
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Instant,
}

impl TokenInfo {
    /// Still usable if `now < expires_at - safety_margin`
    pub fn is_valid(&self, safety_margin: Duration) -> bool {
        match self.expires_at.checked_sub(safety_margin) {
            Some(refresh_at) => Instant::now() < refresh_at,
            None => false,
        }
    }

    /// `Authorization` header value, honouring the provider-supplied scheme
    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// JSON:API resource object
///
/// Known members are typed; anything else the server sends at resource level
/// (`links`, `meta`, ...) is kept in `extra` instead of being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<A> {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: A,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub relationships: HashMap<String, Value>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl<A> Resource<A> {
    /// Ids referenced by a to-one or to-many relationship
    pub fn related_ids(&self, relationship: &str) -> Vec<&str> {
        match self.relationships.get(relationship).and_then(|r| r.get("data")) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|i| i.get("id").and_then(Value::as_str))
                .collect(),
            Some(Value::Object(item)) => item
                .get("id")
                .and_then(Value::as_str)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// `{ "type": ..., "id": ... }` relationship linkage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// Request body in the `{"data": {"type", "attributes", "relationships"}}` shape
#[derive(Debug, Clone)]
pub struct ResourceBody {
    kind: String,
    id: Option<String>,
    attributes: Value,
    relationships: Map<String, Value>,
}

impl ResourceBody {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            attributes: Value::Object(Map::new()),
            relationships: Map::new(),
        }
    }

    /// Id of the resource being updated
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn attributes<A: Serialize>(mut self, attributes: &A) -> Result<Self, ApiError> {
        self.attributes = serde_json::to_value(attributes)
            .map_err(|e| ApiError::InvalidOperation(format!("attributes are not serializable: {}", e)))?;
        Ok(self)
    }

    /// Add a to-one relationship
    pub fn relationship(mut self, name: impl Into<String>, kind: impl Into<String>, id: impl Into<String>) -> Self {
        let linkage = ResourceIdentifier {
            kind: kind.into(),
            id: id.into(),
        };
        self.relationships.insert(name.into(), json!({ "data": linkage }));
        self
    }

    /// Add a to-many relationship
    pub fn relationships(mut self, name: impl Into<String>, linkage: Vec<ResourceIdentifier>) -> Self {
        self.relationships.insert(name.into(), json!({ "data": linkage }));
        self
    }

    pub fn to_json(&self) -> Value {
        let mut data = Map::new();
        data.insert("type".to_string(), Value::String(self.kind.clone()));
        if let Some(id) = &self.id {
            data.insert("id".to_string(), Value::String(id.clone()));
        }
        data.insert("attributes".to_string(), self.attributes.clone());
        if !self.relationships.is_empty() {
            data.insert("relationships".to_string(), Value::Object(self.relationships.clone()));
        }
        json!({ "data": data })
    }
}

/// Paging metadata of a list response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u64>,
}

impl PageMeta {
    /// 1-based page number, derived from offset/per_page when not sent
    pub fn current_page(&self) -> Option<u64> {
        self.current_page.or_else(|| match self.per_page {
            Some(per_page) if per_page > 0 => Some(self.offset.unwrap_or(0) / per_page + 1),
            _ => None,
        })
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.total_pages.or_else(|| match (self.total_count, self.per_page) {
            (Some(total), Some(per_page)) if per_page > 0 => Some(total.div_ceil(per_page)),
            _ => None,
        })
    }
}

/// Navigation links of a list response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(default, rename = "self")]
    pub self_link: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default, alias = "prev")]
    pub previous: Option<String>,
}

/// Converts a wire DTO into a domain model
///
/// Supplied per resource type; the client only calls it after a body was
/// fetched and parsed successfully.
pub trait ResponseMapper {
    type Dto: DeserializeOwned;
    type Model;

    fn to_model(&self, dto: Self::Dto) -> Result<Self::Model, ApiError>;
}

/// Converts a domain request into a wire DTO
pub trait RequestMapper {
    type Request;
    type Dto: Serialize;

    fn to_dto(&self, request: &Self::Request) -> Result<Self::Dto, ApiError>;
}

//! Sort order building
//!
//! Sort keys accumulate in call order; the first key is the primary sort.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBy {
    Asc(String),
    Desc(String),
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self::Asc(field.into())
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::Desc(field.into())
    }

    pub fn field(&self) -> &str {
        match self {
            OrderBy::Asc(field) | OrderBy::Desc(field) => field,
        }
    }

    pub fn is_descending(&self) -> bool {
        matches!(self, OrderBy::Desc(_))
    }

    /// `field` or `field desc`
    pub fn to_query_string(&self) -> String {
        match self {
            OrderBy::Asc(field) => field.clone(),
            OrderBy::Desc(field) => format!("{} desc", field),
        }
    }

    /// Parse one sort key; accepts `field`, `field asc`, `field desc` and `-field`
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(field) = raw.strip_prefix('-') {
            return (!field.is_empty()).then(|| Self::desc(field.trim()));
        }
        match raw.rsplit_once(' ') {
            Some((field, direction)) if direction.eq_ignore_ascii_case("desc") => Some(Self::desc(field.trim())),
            Some((field, direction)) if direction.eq_ignore_ascii_case("asc") => Some(Self::asc(field.trim())),
            _ if raw.is_empty() => None,
            _ => Some(Self::asc(raw)),
        }
    }
}

/// Ordered list of sort keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderByClause {
    clauses: Vec<OrderBy>,
}

impl OrderByClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, order: OrderBy) -> Self {
        self.clauses.push(order);
        self
    }

    pub fn push(&mut self, order: OrderBy) {
        self.clauses.push(order);
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderBy> {
        self.clauses.iter()
    }

    pub fn into_vec(self) -> Vec<OrderBy> {
        self.clauses
    }

    pub fn to_query_string(&self) -> Option<String> {
        if self.clauses.is_empty() {
            None
        } else {
            let order_strings: Vec<String> = self.clauses.iter().map(|o| o.to_query_string()).collect();
            Some(order_strings.join(","))
        }
    }
}

impl From<Vec<OrderBy>> for OrderByClause {
    fn from(clauses: Vec<OrderBy>) -> Self {
        Self { clauses }
    }
}

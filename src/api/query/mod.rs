//! List query construction
//!
//! Follows the same pattern throughout: [`Query`] is the reusable value,
//! [`QueryBuilder`] the fluent way to make one. Filters are translated into a
//! [`QueryDescription`], which owns the wire encoding.

pub mod builder;
pub mod description;
pub mod field;
pub mod filters;
pub mod orderby;
pub mod query;
pub mod result;
pub mod translate;

pub use builder::QueryBuilder;
pub use description::{Clause, Logic, Operator, Paging, QueryDescription};
pub use field::{By, Field, FieldAccess, Predicate, Selector, by};
pub use filters::{CountComparison, Filter, FilterValue, RelationshipFilter};
pub use orderby::{OrderBy, OrderByClause};
pub use query::Query;
pub use result::{PagedResult, Pages};

pub mod api;
pub mod config;

pub use api::{ApiError, Credentials, PlanningCenterClient, QueryBuilder, Result};
pub use config::ClientConfig;

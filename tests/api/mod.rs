mod aggregates;
mod auth;
mod client;
mod mappers;
mod paging;
mod queries;

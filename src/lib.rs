//! backend-storage - collection storage with a join-query engine
//!
//! Records live in named collections (memory, file or SQLite backed). Searches
//! run a driving query, resolve declared joins per candidate record and shape
//! the result through sandboxed expose transforms.

pub mod cli;
pub mod collection;
pub mod config;
pub mod executor;
pub mod expression;
pub mod http_server;
pub mod observability;
pub mod query;

//! # Storage HTTP Server Module
//!
//! Axum server exposing the collection registry and the join-query engine.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `<prefix>/save`, `/update`, `/delete`, `/get` - Record operations
//! - `<prefix>/search` - Joined search
//! - `<prefix>/collection/default`, `/transaction/end` - Registry control
//!
//! `<prefix>` is `route_prefix` from the configuration (`/storage` by default).

pub mod errors;
pub mod observability_routes;
pub mod server;
pub mod storage_routes;

pub use errors::{ApiError, ApiResult, ErrorResponse};
pub use server::HttpServer;
pub use storage_routes::{storage_routes, StorageState};

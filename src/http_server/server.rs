//! # HTTP Server
//!
//! Health check at the root, storage routes under the configured prefix.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::collection::CollectionRegistry;
use crate::config::Config;
use crate::observability::{log_event_with_fields, Event};

use super::observability_routes::health_routes;
use super::storage_routes::{storage_routes, StorageState};

/// HTTP server for the storage service
pub struct HttpServer {
    addr: String,
    route_prefix: String,
    router: Router,
}

impl HttpServer {
    /// Create a server bound to `registry`
    pub fn new(config: &Config, registry: Arc<CollectionRegistry>) -> Self {
        let router = Self::build_router(config, registry);
        Self {
            addr: config.socket_addr(),
            route_prefix: config.route_prefix.clone(),
            router,
        }
    }

    fn build_router(config: &Config, registry: Arc<CollectionRegistry>) -> Router {
        let storage_state = Arc::new(StorageState::new(registry));

        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .nest(&config.route_prefix, storage_routes(storage_state))
            .layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> &str {
        &self.addr
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind and serve until the listener fails
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self.addr.parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid socket address '{}': {}", self.addr, e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?.to_string();
        log_event_with_fields(
            Event::Serving,
            &[("addr", local.as_str()), ("prefix", self.route_prefix.as_str())],
        );

        axum::serve(listener, self.router).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionType;

    fn registry() -> Arc<CollectionRegistry> {
        Arc::new(CollectionRegistry::new("unused", CollectionType::Memory))
    }

    #[test]
    fn test_server_creation() {
        let server = HttpServer::new(&Config::default(), registry());
        assert_eq!(server.socket_addr(), "0.0.0.0:10001");
    }

    #[test]
    fn test_server_with_custom_port() {
        let config = Config {
            port: 8080,
            cors_origins: vec!["http://localhost:5173".into()],
            ..Config::default()
        };
        let server = HttpServer::new(&config, registry());
        assert_eq!(server.socket_addr(), "0.0.0.0:8080");
        let _router = server.router();
    }

    #[tokio::test]
    async fn test_start_rejects_bad_address() {
        let config = Config {
            host: "not an address".into(),
            ..Config::default()
        };
        let err = HttpServer::new(&config, registry()).start().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}

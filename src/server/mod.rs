//! HTTP server components for release-gate
//!
//! This module provides the HTTP server infrastructure including:
//! - Router configuration and route handlers
//! - CORS, authentication and logging middleware
//! - Server lifecycle management

pub mod middleware;
pub mod router;

pub use middleware::{ClientIdentity, ALLOW_HEADERS, ALLOW_METHODS, ALLOW_ORIGIN};
pub use router::{build_router, AppState, DownloadUrlResponse, InfoResponse};

use std::future::Future;
use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;

use crate::config::ServerConfig;

/// HTTP Server for release-gate
///
/// Binds the configured address and serves the proxy router until the
/// shutdown future resolves.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip: IpAddr = self
            .config
            .host
            .parse()
            .map_err(|_| ServerError::Config(format!("invalid host: {}", self.config.host)))?;
        Ok(SocketAddr::new(ip, self.config.port))
    }

    /// Run the server until shutdown signal is received
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let addr = self.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let app = build_router(self.state)
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .layer(tower_http::compression::CompressionLayer::new());

        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;
        tracing::info!(addr = %local, "Server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    /// Failed to serve requests
    #[error("Server error: {0}")]
    Serve(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, AuthManager, RateLimitConfig};
    use crate::upstream::MockReleaseSource;
    use std::sync::Arc;
    use std::time::Duration;

    fn create_test_state() -> AppState {
        let auth_manager = AuthManager::new(
            AuthConfig {
                password: "pw".to_string(),
                identity_headers: vec![],
                rate_limit: RateLimitConfig::default(),
            },
            None,
        );

        AppState {
            auth_manager: Arc::new(auth_manager),
            releases: Arc::new(MockReleaseSource::new()),
            metrics: None,
        }
    }

    // Test 1: Server can be created with config
    #[test]
    fn test_server_new() {
        let server = Server::new(ServerConfig::default(), create_test_state());
        assert_eq!(server.bind_addr().unwrap().port(), 8080);
    }

    // Test 2: Server bind address calculation
    #[test]
    fn test_server_bind_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9090,
        };
        let server = Server::new(config, create_test_state());
        assert_eq!(server.bind_addr().unwrap().to_string(), "127.0.0.1:9090");
    }

    // Test 3: Unparseable host is a configuration error
    #[test]
    fn test_server_bind_addr_invalid_host() {
        let config = ServerConfig {
            host: "not-an-ip".to_string(),
            port: 9090,
        };
        let server = Server::new(config, create_test_state());
        assert!(matches!(server.bind_addr(), Err(ServerError::Config(_))));
    }

    // Test 4: Server graceful shutdown
    #[tokio::test]
    async fn test_server_graceful_shutdown() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let server = Server::new(config, create_test_state());

        let shutdown = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        };

        let handle = tokio::spawn(async move { server.run(shutdown).await });
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    // Test 5: ServerError display messages
    #[test]
    fn test_server_error_display() {
        let bind_err = ServerError::Bind("address in use".to_string());
        assert_eq!(
            bind_err.to_string(),
            "Failed to bind to address: address in use"
        );

        let config_err = ServerError::Config("invalid host: x".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: invalid host: x");
    }
}

//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use wiremock::MockServer;

use release_gate::auth::{AuthConfig, AuthManager, RateLimitConfig};
use release_gate::config::UpstreamConfig;
use release_gate::error::StoreError;
use release_gate::server::AppState;
use release_gate::store::{KvStore, MemoryStore};
use release_gate::upstream::GitHubClient;

pub const PASSWORD: &str = "correct horse battery staple";
pub const REPO: &str = "acme/widgets";
pub const TOKEN: &str = "ghp_integration_token";

/// In-memory store that counts every call made against it
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Puts and deletes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn raw(&self, identity: &str) -> Option<String> {
        self.inner.get(identity).await.ok().flatten()
    }
}

#[async_trait]
impl KvStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
}

/// Store whose every operation fails
pub struct BrokenStore;

#[async_trait]
impl KvStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }
}

/// Upstream configuration pointing at a mock GitHub API
pub fn upstream_config(upstream: &MockServer) -> UpstreamConfig {
    UpstreamConfig {
        api_url: upstream.uri(),
        token: TOKEN.to_string(),
        repo: REPO.to_string(),
        timeout_secs: 2,
        user_agent: "release-gate-integration".to_string(),
    }
}

/// Create a test application state against the mock upstream
pub fn create_test_state(upstream: &MockServer, store: Option<Arc<dyn KvStore>>) -> AppState {
    create_test_state_with_password(upstream, store, PASSWORD)
}

/// Create a test application state with a specific shared secret
pub fn create_test_state_with_password(
    upstream: &MockServer,
    store: Option<Arc<dyn KvStore>>,
    password: &str,
) -> AppState {
    let auth_config = AuthConfig {
        password: password.to_string(),
        identity_headers: vec![
            "CF-Connecting-IP".to_string(),
            "X-Forwarded-For".to_string(),
            "X-Real-IP".to_string(),
        ],
        rate_limit: RateLimitConfig::default(),
    };

    AppState {
        auth_manager: Arc::new(AuthManager::new(auth_config, store)),
        releases: Arc::new(
            GitHubClient::new(&upstream_config(upstream)).expect("Failed to build upstream client"),
        ),
        metrics: None,
    }
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(state: AppState) -> (SocketAddr, oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let app = release_gate::server::build_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}

/// GET a proxy path as a given client, optionally with a password
pub async fn get_as(
    addr: SocketAddr,
    path: &str,
    client_ip: &str,
    password: Option<&str>,
) -> reqwest::Response {
    let mut request = reqwest::Client::new()
        .get(format!("http://{}{}", addr, path))
        .header("CF-Connecting-IP", client_ip);
    if let Some(password) = password {
        request = request.header("X-Password", password);
    }
    request.send().await.expect("Request failed")
}

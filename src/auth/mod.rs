//! Authentication system for release-gate
//!
//! This module provides the request gate that runs before any routing:
//! - Client identity derivation from request headers
//! - Constant-time shared-secret comparison
//! - Rate limiting for failed attempts, backed by a durable store

pub mod credential;
pub mod identity;
pub mod manager;
pub mod ratelimit;

pub use credential::verify_secret;
pub use identity::{client_identity, UNKNOWN_IDENTITY};
pub use manager::{AuthConfig, AuthManager};
pub use ratelimit::{BlockStatus, RateLimitConfig, RateLimitRecord, RateLimiter};

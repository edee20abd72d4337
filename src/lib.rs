//! release-gate - A password-gated proxy for private GitHub release assets
//!
//! This crate provides a small HTTP service that lets trusted callers list a
//! private repository's releases and obtain short-lived asset download URLs
//! without ever seeing the upstream access token. Failed password attempts are
//! rate limited per client identity through a durable key-value store.

pub mod auth;
pub mod config;
pub mod error;
pub mod otel;
pub mod server;
pub mod store;
pub mod upstream;

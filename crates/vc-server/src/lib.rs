//! # vc-server
//!
//! HTTP server for ChatterVC.
//!
//! Provides:
//! - OpenAI-compatible speech endpoint (`POST /v1/audio/speech`)
//! - Model and voice listings
//! - Health check and service info
//! - Prometheus metrics endpoint

pub mod error;
pub mod server;
pub mod service;

pub use error::ApiError;
pub use server::{VcServer, router};
pub use service::AppState;

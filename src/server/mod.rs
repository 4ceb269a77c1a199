//! HTTP server module
//!
//! A small HTTP/1.1 front door that authenticates every request and answers
//! with the resolved identity.
//!
//! | Request            | Response                                           |
//! |--------------------|----------------------------------------------------|
//! | `GET /health`      | `200 {"status":"ok"}`                              |
//! | `GET /metrics`     | Prometheus text format (when metrics are enabled)  |
//! | anything else      | `200` identity JSON, `401`, or `503`               |
//!
//! A `401` carries the challenge header when a domain asked for another round
//! trip. Failure details are only logged, never sent to the client.

mod http;

pub use http::AuthServer;

use crate::pipeline::AuthPipeline;
use crate::xff::XffResolver;
use std::sync::Arc;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),
}

/// Everything a request handler needs, shared across connections
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AuthPipeline>,
    pub xff: Arc<XffResolver>,
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(pipeline: Arc<AuthPipeline>, xff: Arc<XffResolver>) -> Self {
        Self {
            pipeline,
            xff,
            metrics_enabled: true,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}

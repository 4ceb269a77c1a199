//! Metrics module
//!
//! Prometheus counters for authentication outcomes and chain rebuilds.

use lazy_static::lazy_static;
use prometheus::{register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder};

lazy_static! {
    // Auth metrics
    pub static ref AUTH_ATTEMPTS: CounterVec = register_counter_vec!(
        "authgate_auth_attempts_total",
        "Authentication attempts per domain",
        &["domain", "status"]
    ).unwrap();

    pub static ref AUTH_CHALLENGES: CounterVec = register_counter_vec!(
        "authgate_auth_challenges_total",
        "Requests answered with a re-authentication challenge",
        &["domain"]
    ).unwrap();

    pub static ref AUTH_REJECTIONS: Counter = register_counter!(
        "authgate_auth_rejections_total",
        "Requests rejected after every domain was exhausted"
    ).unwrap();

    pub static ref ANONYMOUS_GRANTS: Counter = register_counter!(
        "authgate_anonymous_grants_total",
        "Requests granted the anonymous identity"
    ).unwrap();

    pub static ref SESSION_HITS: Counter = register_counter!(
        "authgate_session_hits_total",
        "Requests authenticated by an existing session"
    ).unwrap();

    // Configuration metrics
    pub static ref CHAIN_REBUILDS: CounterVec = register_counter_vec!(
        "authgate_chain_rebuilds_total",
        "Authentication chain rebuilds",
        &["status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "authgate_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record an authentication attempt against one domain
pub fn record_auth_attempt(domain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    AUTH_ATTEMPTS.with_label_values(&[domain, status]).inc();
}

pub fn record_challenge(domain: &str) {
    AUTH_CHALLENGES.with_label_values(&[domain]).inc();
}

pub fn record_rejection() {
    AUTH_REJECTIONS.inc();
}

pub fn record_anonymous_grant() {
    ANONYMOUS_GRANTS.inc();
}

pub fn record_session_hit() {
    SESSION_HITS.inc();
}

/// Record a chain rebuild
pub fn record_chain_rebuild(success: bool) {
    let status = if success { "success" } else { "failure" };
    CHAIN_REBUILDS.with_label_values(&[status]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render every registered metric in the Prometheus text format
///
/// Returns the body and its content type.
pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

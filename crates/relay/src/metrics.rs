//! Prometheus metrics for the relay.
//!
//! The `/metrics` endpoint is unauthenticated; bind the relay to loopback
//! unless scraping from elsewhere is intended.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{self, Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Command metrics
pub static COMMANDS_HANDLED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burner_commands_handled_total",
            "Total commands handled by command name",
        ),
        &["command"],
    )
    .expect("metric creation failed")
});

pub static COMMAND_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burner_command_failures_total",
            "Total commands answered with a failure, by command and error code",
        ),
        &["command", "code"],
    )
    .expect("metric creation failed")
});

// Update cache metrics
pub static REFRESHES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burner_refreshes_total",
            "Total version-marker refreshes by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static PAYLOAD_DOWNLOADS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burner_payload_downloads_total",
            "Total payload downloads by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

// Rule metrics
pub static RULE_INSTALL_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burner_rule_install_failures_total",
            "Total rule group installs rejected by the sink",
        ),
        &["group"],
    )
    .expect("metric creation failed")
});

// Socket metrics
pub static OPEN_SOCKETS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "burner_proxied_sockets",
        "Current number of proxied sockets (connecting or open)",
    )
    .expect("metric creation failed")
});

pub static UNDELIVERED_EVENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "burner_undelivered_events_total",
            "Socket events dropped because the page context was gone",
        ),
        &["event"],
    )
    .expect("metric creation failed")
});

pub static PAGE_CONTEXTS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "burner_page_contexts",
        "Current number of connected page contexts",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedded routers may call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(COMMANDS_HANDLED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(COMMAND_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REFRESHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PAYLOAD_DOWNLOADS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RULE_INSTALL_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(OPEN_SOCKETS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UNDELIVERED_EVENTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PAGE_CONTEXTS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a command failure.
pub fn record_command_failure(command: &str, code: &str) {
    COMMAND_FAILURES.with_label_values(&[command, code]).inc();
}

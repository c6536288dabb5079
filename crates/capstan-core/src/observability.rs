//! Observability infrastructure for Capstan.
//!
//! Structured logging with consistent spans across all Capstan components.
//! This module provides initialization helpers and span constructors.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at service startup. Safe to call multiple times; subsequent
/// calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: controls log levels (e.g., `info`, `capstan_deploy=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for deployment-trigger operations with standard fields.
///
/// # Example
///
/// ```rust
/// use capstan_core::observability::trigger_span;
///
/// let span = trigger_span("notify_of_completion", "acme.shop");
/// let _guard = span.enter();
/// // ... handle the completion
/// ```
#[must_use]
pub fn trigger_span(operation: &str, application: &str) -> Span {
    tracing::info_span!(
        "deployment_trigger",
        op = operation,
        application = application,
    )
}

//! Tracing subscriber setup with configurable log formats.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from the
/// configured level. The format is one of pretty, compact, or JSON.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match (logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty().with_target(true);
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        (LogFormat::Pretty, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .without_time();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        (LogFormat::Compact, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer().compact();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        (LogFormat::Compact, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer().compact().without_time();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        (LogFormat::Json, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
        (LogFormat::Json, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer().json().without_time();
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
    }
}

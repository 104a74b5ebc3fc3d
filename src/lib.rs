pub mod classify;
pub mod config;
pub mod cursor;
pub mod delivery;
pub mod error;
pub mod forwarder;
pub mod platform;
pub mod report;

/// Install the tracing subscriber shared by all binaries.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tgforward=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

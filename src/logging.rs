use std::env;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn";

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env("DAYLENS_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn json_requested() -> bool {
    matches!(
        env::var("DAYLENS_LOG_FORMAT").as_deref().map(str::trim),
        Ok("json") | Ok("JSON")
    )
}

/// Install the process-wide subscriber. Logs go to stderr so command output
/// on stdout stays machine-readable.
pub fn init() {
    let registry = tracing_subscriber::registry().with(filter_from_env());
    let result = if json_requested() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("daylens: logging already initialized: {err}");
    }
}

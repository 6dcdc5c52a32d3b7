use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "dns_reconciler=debug,tower_http=debug";

/// Install the global subscriber. `RUST_LOG` wins over the built-in filter.
pub fn init() {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => {
            eprintln!(
                "[tracing] using RUST_LOG={}",
                std::env::var("RUST_LOG").unwrap_or_default()
            );
            f
        }
        Err(e) => {
            eprintln!("[tracing] RUST_LOG not set or invalid ({e}), defaulting to: {DEFAULT_FILTER}");
            EnvFilter::new(DEFAULT_FILTER)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(false)
                .with_ansi(true),
        )
        .init();
}

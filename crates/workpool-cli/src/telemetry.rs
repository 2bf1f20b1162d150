use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes structured logging on stderr.
///
/// The level defaults to `info` and can be overridden with `RUST_LOG` (e.g.
/// `RUST_LOG=workpool=debug` to see every task start and finish). Stdout is
/// left for the harness report.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        )
        .init();
}

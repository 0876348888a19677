use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// Diagnostics go to stderr; stdout is left to results. RUST_LOG wins over `verbose`.
pub fn init(verbose: bool, ansi: bool) {
    let default_filter = if verbose {
        "inboxprobe=debug"
    } else {
        "inboxprobe=warn"
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(false),
        )
        .try_init();
}

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber, writing to stderr so stdout stays clean for
/// command output.
///
/// `debug` wins over everything. Otherwise `RUST_LOG` is honoured, then
/// `level`, then `warn`. Calling this again is a no-op.
pub fn init(debug: bool, level: Option<&str>) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("warn")))
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

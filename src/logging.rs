use tracing_subscriber::EnvFilter;

/// Initialise logging. The default level is `info`; `debug` level can be
/// explicitly enabled via the settings file, in which case the `RUST_LOG`
/// environment variable may override it.
pub fn init(debug: bool) {
    // When debug logging is disabled we force `info` level regardless of the
    // `RUST_LOG` environment variable. This prevents accidental verbose output
    // if the variable happens to be set in the user's environment.
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

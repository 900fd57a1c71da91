//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process, writing to stderr so command output
/// on stdout stays machine-readable.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks `debug` over `warn`.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(verbose: bool) {
    let default = if verbose { "coffer=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

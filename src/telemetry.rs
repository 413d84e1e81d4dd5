//! `tracing` subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive (e.g. `alertwise=debug`).
pub const LOG_ENV: &str = "ALERTWISE_LOG";

/// Installs a global fmt subscriber writing to stderr, filtered by [`LOG_ENV`]
/// (default `info`). Calling it twice is harmless; the second call is ignored.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

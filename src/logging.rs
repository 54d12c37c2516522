//! Diagnostic logging to stderr.
//!
//! Filter directives come from `OK_LOG` (e.g. `OK_LOG=okgrade=debug`). Without
//! it only warnings are shown, or `info` and above in verbose mode.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "OK_LOG";

pub fn init(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    // A subscriber may already be installed by an embedding program or test.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

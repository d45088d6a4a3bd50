//! Tracing subscriber setup.
//!
//! Logs go to stderr so JSON and CSV on stdout stay machine readable.

use tracing_subscriber::EnvFilter;

/// Environment variable read when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "BOUNTYX_LOG";

/// Default filter for the given verbosity flags.
fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "bountyx=debug"
    } else if quiet {
        "bountyx=warn"
    } else {
        "bountyx=info"
    }
}

/// Build the filter: `RUST_LOG`, then `BOUNTYX_LOG`, then the flags.
pub fn filter(verbose: bool, quiet: bool) -> EnvFilter {
    std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive(verbose, quiet)))
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(verbose: bool, quiet: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, quiet))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

//! Shared logging setup for the pgclone CLI and test binaries.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "pgclone=info,pgclone_cli=info";
const VERBOSE_LOG_FILTER: &str = "pgclone=debug,pgclone_cli=debug";
const TEST_LOG_FILTER: &str = "pgclone=debug";

/// Logging configuration for pgclone binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Initialize tracing with stderr output.
///
/// `RUST_LOG` wins over both defaults. Fails if a global subscriber is
/// already installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = console_filter(config.verbose);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.verbose)
                .with_filter(filter),
        )
        .try_init()
        .with_context(|| format!("Failed to initialize logging for {}", config.app_name))?;

    Ok(())
}

/// Route pgclone's logs through the test harness's captured output.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(TEST_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

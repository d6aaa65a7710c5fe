//! Logging setup using tracing
//!
//! Log lines go to stderr so stdout stays free for the authorization prompt.
//! `RUST_LOG` wins over the `--verbose` flag when set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,jira_tasks_sync=debug"
    } else {
        "info"
    }
}

/// Initialize the tracing subscriber.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    Ok(())
}

//! Tracing subscriber initialization for hosts embedding the bus.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// Respects `RUST_LOG`, defaulting to `info`. With `json` set, events are
/// written as one JSON object per line; otherwise the human-readable format
/// with targets is used.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails() {
        // Whichever call runs first in this process wins; a later one must fail.
        let _ = init_tracing(false);
        assert!(init_tracing(true).is_err());
    }
}

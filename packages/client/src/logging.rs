//! `tracing` subscriber bootstrap for binaries and tests.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "partnerlink_client=info";

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`]. Does nothing if a global subscriber is already set.
pub fn init() {
    let _ = try_init();
}

/// Like [`init`], but reports a subscriber that is already installed.
pub fn try_init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init();
        init();
        assert!(try_init().is_err());
    }
}

//! Log output for test binaries.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "warn";

static INIT: Once = Once::new();

/// Install a `tracing` subscriber that writes through the test harness
///
/// Honors `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Safe to call from
/// every test; only the first call has an effect, and a subscriber
/// installed elsewhere is left alone.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        tracing::debug!("still fine");
    }
}

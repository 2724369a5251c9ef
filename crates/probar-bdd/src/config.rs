//! Process-wide configuration

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Command-line flag that turns on verbose scenario titles
pub const VERBOSE_FLAG: &str = "-v";

static GLOBAL: OnceLock<BddConfig> = OnceLock::new();

/// Output verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Normal - scenario descriptions only
    #[default]
    Normal,
    /// Verbose - scenario descriptions plus every step
    Verbose,
}

impl Verbosity {
    /// Check if verbose
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose)
    }
}

/// BDD configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BddConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
}

impl BddConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Build from process arguments; `-v` anywhere enables verbose titles
    #[must_use]
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let verbose = args.into_iter().any(|a| a.as_ref() == VERBOSE_FLAG);
        Self::new().with_verbosity(if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        })
    }

    /// Configuration of this process, read from its arguments once
    #[must_use]
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Self::from_args(std::env::args()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_normal() {
        assert_eq!(BddConfig::default().verbosity, Verbosity::Normal);
        assert!(!Verbosity::Normal.is_verbose());
        assert!(Verbosity::Verbose.is_verbose());
    }

    #[test]
    fn test_dash_v_enables_verbose() {
        let config = BddConfig::from_args(["test-binary", "--nocapture", "-v"]);
        assert!(config.verbosity.is_verbose());
    }

    #[test]
    fn test_flag_must_match_exactly() {
        let config = BddConfig::from_args(["test-binary", "-vv", "--verbose", "v"]);
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert_eq!(BddConfig::from_args(Vec::<String>::new()), BddConfig::new());
    }

    #[test]
    fn test_global_is_stable() {
        let first = BddConfig::global();
        let second = BddConfig::global();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_config_serializes() {
        let config = BddConfig::new().with_verbosity(Verbosity::Verbose);
        let json = serde_json::to_string(&config).unwrap();
        let back: BddConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

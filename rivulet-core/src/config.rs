//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// How many times a single subscriber may re-run inside one flush before the
/// scheduler declares an infinite update loop.
pub const DEFAULT_MAX_RECURSION: usize = 100;

/// How pending flushes are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Spawn a flush task on the ambient tokio runtime if it is a
    /// current-thread runtime. Otherwise the flush stays pending until
    /// `flush`/`next_tick`.
    #[default]
    Spawn,
    /// Flushes only happen through `Runtime::flush` or `Runtime::next_tick`.
    Manual,
}

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Per-subscriber re-run cap within one flush.
    pub max_recursion: usize,
    pub flush_mode: FlushMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_recursion: DEFAULT_MAX_RECURSION,
            flush_mode: FlushMode::default(),
        }
    }
}

impl RuntimeConfig {
    /// Configuration that never spawns flush tasks.
    pub fn manual() -> Self {
        Self {
            flush_mode: FlushMode::Manual,
            ..Self::default()
        }
    }

    pub fn with_max_recursion(mut self, limit: usize) -> Self {
        self.max_recursion = limit;
        self
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(source).map_err(|e| ReactiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_recursion == 0 {
            return Err(ReactiveError::Config(
                "max_recursion must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_recursion, DEFAULT_MAX_RECURSION);
        assert_eq!(config.flush_mode, FlushMode::Spawn);
    }

    #[test]
    fn parses_partial_json() {
        let config = RuntimeConfig::from_json(r#"{ "flush_mode": "manual" }"#).unwrap();
        assert_eq!(config.flush_mode, FlushMode::Manual);
        assert_eq!(config.max_recursion, DEFAULT_MAX_RECURSION);
    }

    #[test]
    fn rejects_zero_recursion() {
        let err = RuntimeConfig::from_json(r#"{ "max_recursion": 0 }"#).unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(RuntimeConfig::from_json(r#"{ "flush_mode": "eager" }"#).is_err());
    }
}

//! Engine Configuration
//!
//! Tunables for the event loop. Values come from defaults, a JSON document,
//! or the environment.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Environment variable overriding [`EngineConfig::max_ticks`].
pub const MAX_TICKS_ENV: &str = "CASCADE_MAX_TICKS";

const DEFAULT_MAX_TICKS: usize = 10_000;

/// Configuration consumed by [`EventLoop`](crate::scheduler::EventLoop).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on consecutive ticks `run_until_idle` will execute.
    ///
    /// A cell whose subscriber always sets it to a new value never goes
    /// idle; the bound turns that into an error instead of a hang.
    pub max_ticks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()
    }

    /// Defaults, overridden by `CASCADE_MAX_TICKS` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(MAX_TICKS_ENV) {
            config.max_ticks = raw.trim().parse().map_err(|_| {
                EngineError::Config(format!("{MAX_TICKS_ENV} is not a number: {raw:?}"))
            })?;
        }
        config.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.max_ticks == 0 {
            return Err(EngineError::Config("max_ticks must be positive".into()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(EngineConfig::default().max_ticks, DEFAULT_MAX_TICKS);
    }

    #[test]
    fn json_overrides_and_fills_defaults() {
        let config = EngineConfig::from_json(r#"{ "max_ticks": 64 }"#).unwrap();
        assert_eq!(config.max_ticks, 64);

        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn rejects_zero_ticks() {
        let err = EngineConfig::from_json(r#"{ "max_ticks": 0 }"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(EngineConfig::from_json("not json").is_err());
    }
}

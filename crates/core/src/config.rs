// Orchestrator Configuration

use crate::application::orchestrator::constants::{
    BOOT_POLL_INTERVAL, DEFAULT_BOOT_TIMEOUT_SECS, DEFAULT_PARALLEL_SLOTS,
};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Scheduler strategy selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Fixed number of interchangeable slots
    Parallel { slots: usize },
    /// Single line with overlapping completion
    Seamless,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Parallel {
            slots: DEFAULT_PARALLEL_SLOTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Upper bound a caller should wait for the boot sequence
    #[serde(default = "default_boot_timeout_secs")]
    pub boot_timeout_secs: u64,
    #[serde(default = "default_boot_poll_interval_ms")]
    pub boot_poll_interval_ms: u64,
}

fn default_boot_timeout_secs() -> u64 {
    DEFAULT_BOOT_TIMEOUT_SECS
}

fn default_boot_poll_interval_ms() -> u64 {
    BOOT_POLL_INTERVAL.as_millis() as u64
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            boot_timeout_secs: default_boot_timeout_secs(),
            boot_poll_interval_ms: default_boot_poll_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if let StrategyConfig::Parallel { slots: 0 } = self.strategy {
            return Err(AppError::Config(
                "parallel strategy needs at least one slot".into(),
            ));
        }
        if self.boot_poll_interval_ms == 0 {
            return Err(AppError::Config(
                "boot_poll_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: OrchestratorConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `LINEFLOW_STRATEGY`, `LINEFLOW_SLOTS` and `LINEFLOW_BOOT_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` over an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let slots = match lookup("LINEFLOW_SLOTS") {
            Some(raw) => parse_number::<usize>("LINEFLOW_SLOTS", &raw)?,
            None => DEFAULT_PARALLEL_SLOTS,
        };

        config.strategy = match lookup("LINEFLOW_STRATEGY").as_deref() {
            None | Some("parallel") => StrategyConfig::Parallel { slots },
            Some("seamless") => StrategyConfig::Seamless,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "unknown strategy `{other}` (expected `parallel` or `seamless`)"
                )))
            }
        };

        if let Some(raw) = lookup("LINEFLOW_BOOT_TIMEOUT_SECS") {
            config.boot_timeout_secs = parse_number("LINEFLOW_BOOT_TIMEOUT_SECS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{key} is not a valid number: `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_tagged_strategy() {
        let config = OrchestratorConfig::from_json_str(
            r#"{ "strategy": { "kind": "parallel", "slots": 3 }, "boot_timeout_secs": 5 }"#,
        )
        .unwrap();
        assert_eq!(config.strategy, StrategyConfig::Parallel { slots: 3 });
        assert_eq!(config.boot_timeout_secs, 5);
        assert_eq!(
            config.boot_poll_interval_ms,
            BOOT_POLL_INTERVAL.as_millis() as u64
        );

        let config =
            OrchestratorConfig::from_json_str(r#"{ "strategy": { "kind": "seamless" } }"#).unwrap();
        assert_eq!(config.strategy, StrategyConfig::Seamless);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let err = OrchestratorConfig::from_json_str(r#"{ "strategy": { "kind": "parallel", "slots": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err = OrchestratorConfig::from_json_str(r#"{ "boot_poll_interval_ms": 0 }"#).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err = OrchestratorConfig::from_json_str(r#"{ "strategy": { "kind": "burst" } }"#).unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn test_from_environment() {
        let config = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OrchestratorConfig::default());

        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("LINEFLOW_STRATEGY", "seamless"),
            ("LINEFLOW_BOOT_TIMEOUT_SECS", "12"),
        ]))
        .unwrap();
        assert_eq!(config.strategy, StrategyConfig::Seamless);
        assert_eq!(config.boot_timeout_secs, 12);

        let config = OrchestratorConfig::from_lookup(lookup(&[("LINEFLOW_SLOTS", "4")])).unwrap();
        assert_eq!(config.strategy, StrategyConfig::Parallel { slots: 4 });

        assert!(OrchestratorConfig::from_lookup(lookup(&[("LINEFLOW_SLOTS", "many")])).is_err());
        assert!(OrchestratorConfig::from_lookup(lookup(&[("LINEFLOW_STRATEGY", "burst")])).is_err());
    }
}

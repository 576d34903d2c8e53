use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct SyncerConfig {
    /// Time between periodic reconciliation passes.
    pub sync_interval: Duration,
    /// Upper bound on a single register/deregister call.
    pub operation_timeout: Duration,
    /// Registry calls in flight at once within one pass.
    pub max_concurrent_ops: usize,
    /// Wake the sync loop as soon as a domain's services change instead of
    /// waiting for the next interval.
    pub sync_on_change: bool,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(10),
            max_concurrent_ops: 8,
            sync_on_change: false,
        }
    }
}

impl SyncerConfig {
    /// Defaults overridden by `CATALOG_SYNC_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = parse_positive(&lookup, "CATALOG_SYNC_INTERVAL_MS")? {
            config.sync_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_positive(&lookup, "CATALOG_SYNC_OP_TIMEOUT_MS")? {
            config.operation_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_positive(&lookup, "CATALOG_SYNC_MAX_CONCURRENT_OPS")? {
            config.max_concurrent_ops = n as usize;
        }
        if let Some(raw) = lookup("CATALOG_SYNC_ON_CHANGE") {
            config.sync_on_change = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "CATALOG_SYNC_ON_CHANGE",
                        value: raw,
                    });
                }
            };
        }
        Ok(config)
    }

    /// Clamp values that would stall the loop or the op stream.
    pub(crate) fn normalized(mut self) -> Self {
        self.sync_interval = self.sync_interval.max(Duration::from_millis(1));
        self.max_concurrent_ops = self.max_concurrent_ops.max(1);
        self
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(ConfigError::InvalidEnv { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |var| {
            vars.iter()
                .find(|(k, _)| *k == var)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn env_overrides() {
        let config = SyncerConfig::from_lookup(lookup(&[
            ("CATALOG_SYNC_INTERVAL_MS", "250"),
            ("CATALOG_SYNC_MAX_CONCURRENT_OPS", "2"),
            ("CATALOG_SYNC_ON_CHANGE", "true"),
        ]))
        .unwrap();
        assert_eq!(config.sync_interval, Duration::from_millis(250));
        assert_eq!(config.operation_timeout, Duration::from_secs(10));
        assert_eq!(config.max_concurrent_ops, 2);
        assert!(config.sync_on_change);
    }

    #[test]
    fn zero_and_garbage_are_rejected() {
        assert!(SyncerConfig::from_lookup(lookup(&[("CATALOG_SYNC_INTERVAL_MS", "0")])).is_err());
        assert!(SyncerConfig::from_lookup(lookup(&[("CATALOG_SYNC_OP_TIMEOUT_MS", "soon")])).is_err());
        assert!(SyncerConfig::from_lookup(lookup(&[("CATALOG_SYNC_ON_CHANGE", "yes")])).is_err());
    }

    #[test]
    fn normalized_clamps_degenerate_values() {
        let config = SyncerConfig {
            sync_interval: Duration::ZERO,
            max_concurrent_ops: 0,
            ..SyncerConfig::default()
        }
        .normalized();
        assert!(config.sync_interval > Duration::ZERO);
        assert_eq!(config.max_concurrent_ops, 1);
    }
}

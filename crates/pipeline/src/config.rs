use std::str::FromStr;

use carryover_core::results::{DEFAULT_ERROR_THRESHOLD, DEFAULT_MAX_RETAINED_ERRORS};

use crate::error::ConfigError;

/// Default number of persistence worker tasks.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default capacity of the persistence job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Default number of entities between two progress reports.
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

/// Tuning of one import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// Worker tasks of the bounded executor.
    pub pool_size: usize,
    /// Jobs that may wait in the executor queue before `submit` blocks.
    pub queue_capacity: usize,
    /// The import aborts once more errors than this have been recorded.
    pub error_threshold: usize,
    /// Error messages kept in the results.
    pub max_retained_errors: usize,
    /// Entities between two progress reports.
    pub progress_every: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            max_retained_errors: DEFAULT_MAX_RETAINED_ERRORS,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl ImportConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `IMPORT_POOL_SIZE`           | `10`    |
    /// | `IMPORT_QUEUE_CAPACITY`      | `20`    |
    /// | `IMPORT_ERROR_THRESHOLD`     | `10`    |
    /// | `IMPORT_MAX_RETAINED_ERRORS` | `100`   |
    /// | `IMPORT_PROGRESS_EVERY`      | `100`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            pool_size: parse_var(&lookup, "IMPORT_POOL_SIZE", defaults.pool_size)?,
            queue_capacity: parse_var(&lookup, "IMPORT_QUEUE_CAPACITY", defaults.queue_capacity)?,
            error_threshold: parse_var(&lookup, "IMPORT_ERROR_THRESHOLD", defaults.error_threshold)?,
            max_retained_errors: parse_var(
                &lookup,
                "IMPORT_MAX_RETAINED_ERRORS",
                defaults.max_retained_errors,
            )?,
            progress_every: parse_var(&lookup, "IMPORT_PROGRESS_EVERY", defaults.progress_every)?,
        };
        if config.pool_size == 0 {
            return Err(ConfigError::Invalid {
                var: "IMPORT_POOL_SIZE",
                value: "0".into(),
            });
        }
        if config.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "IMPORT_QUEUE_CAPACITY",
                value: "0".into(),
            });
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(ImportConfig::from_lookup(lookup(&[])).unwrap(), ImportConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config =
            ImportConfig::from_lookup(lookup(&[("IMPORT_POOL_SIZE", "4"), ("IMPORT_ERROR_THRESHOLD", " 3 ")]))
                .unwrap();
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.error_threshold, 3);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_matches!(
            ImportConfig::from_lookup(lookup(&[("IMPORT_QUEUE_CAPACITY", "lots")])),
            Err(ConfigError::Invalid { var: "IMPORT_QUEUE_CAPACITY", .. })
        );
        assert_matches!(
            ImportConfig::from_lookup(lookup(&[("IMPORT_POOL_SIZE", "0")])),
            Err(ConfigError::Invalid { var: "IMPORT_POOL_SIZE", .. })
        );
    }
}

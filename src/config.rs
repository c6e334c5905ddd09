//! Configuration for the local store engine.

use std::fmt;
use std::time::Duration;

/// Sentinel used when an interval or duration is left unset: long enough to
/// never fire within the lifetime of a process.
pub(crate) const EFFECTIVELY_NEVER: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const DEFAULT_CAPACITY: usize = 10_000;

/// Configuration for the local store engine.
///
/// All fields have workable defaults: a zero `clean_interval` or
/// `max_clean_duration` disables the corresponding behavior (the sweep
/// effectively never runs / never aborts early), and a zero
/// `initial_capacity` falls back to a reasonable preallocation.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// How often the expiration sweep wakes up.
    pub clean_interval: Duration,

    /// Upper bound on the time a single sweep may spend scanning before
    /// deferring the rest to the next tick.
    pub max_clean_duration: Duration,

    /// Initial capacity of the value and expiration maps.
    pub initial_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            clean_interval: Duration::ZERO,
            max_clean_duration: Duration::ZERO,
            initial_capacity: 0,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sweep wake-up interval.
    pub fn with_clean_interval(mut self, interval: Duration) -> Self {
        self.clean_interval = interval;
        self
    }

    /// Set the per-sweep scan budget.
    pub fn with_max_clean_duration(mut self, duration: Duration) -> Self {
        self.max_clean_duration = duration;
        self
    }

    /// Set the initial map capacity.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Apply defaults and validate.
    ///
    /// The sweep interval must not be shorter than the scan budget: a sweep
    /// still scanning when the next tick fires would pile up.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        if self.clean_interval.is_zero() {
            self.clean_interval = EFFECTIVELY_NEVER;
        }
        if self.max_clean_duration.is_zero() {
            self.max_clean_duration = EFFECTIVELY_NEVER;
        }
        if self.initial_capacity == 0 {
            self.initial_capacity = DEFAULT_CAPACITY;
        }

        if self.clean_interval < self.max_clean_duration {
            return Err(ConfigError::CleanIntervalTooShort {
                clean_interval: self.clean_interval,
                max_clean_duration: self.max_clean_duration,
            });
        }

        Ok(self)
    }
}

/// Errors produced by configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `clean_interval` is shorter than `max_clean_duration`.
    CleanIntervalTooShort {
        clean_interval: Duration,
        max_clean_duration: Duration,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::CleanIntervalTooShort {
                clean_interval,
                max_clean_duration,
            } => write!(
                f,
                "clean_interval ({:?}) cannot be less than max_clean_duration ({:?})",
                clean_interval, max_clean_duration
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_normalized() {
        let config = StoreConfig::new().normalized().unwrap();
        assert_eq!(config.clean_interval, EFFECTIVELY_NEVER);
        assert_eq!(config.max_clean_duration, EFFECTIVELY_NEVER);
        assert_eq!(config.initial_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn interval_shorter_than_budget_is_rejected() {
        let result = StoreConfig::new()
            .with_clean_interval(Duration::from_millis(10))
            .with_max_clean_duration(Duration::from_millis(50))
            .normalized();
        assert!(matches!(
            result,
            Err(ConfigError::CleanIntervalTooShort { .. })
        ));
    }

    #[test]
    fn explicit_values_survive_normalization() {
        let config = StoreConfig::new()
            .with_clean_interval(Duration::from_secs(60))
            .with_max_clean_duration(Duration::from_secs(1))
            .with_initial_capacity(128)
            .normalized()
            .unwrap();
        assert_eq!(config.clean_interval, Duration::from_secs(60));
        assert_eq!(config.max_clean_duration, Duration::from_secs(1));
        assert_eq!(config.initial_capacity, 128);
    }
}

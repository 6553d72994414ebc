//! Sync engine configuration.

use std::time::Duration;

use continuity_realtime::ReconnectConfig;

/// Shortest allowed debounce quiet period.
pub const MIN_DEBOUNCE: Duration = Duration::from_millis(500);
/// Longest allowed debounce quiet period.
pub const MAX_DEBOUNCE: Duration = Duration::from_millis(800);

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_PUSH_RETRIES: u32 = 5;

/// When classified local changes reach the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Changes are only marked pending; `upload_now` pushes them.
    Manual,
    /// Every classified change schedules a debounced push.
    #[default]
    Automatic,
}

impl SyncPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "automatic" | "auto" => Some(Self::Automatic),
            _ => None,
        }
    }
}

/// How a pulled schedule is reconciled with the local one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScheduleMergePolicy {
    /// The schedule with the later `uploaded_at` wins.
    #[default]
    NewestWins,
    /// A local schedule with at least one day is kept whatever the server
    /// holds.
    KeepLocalIfNonEmpty,
}

impl ScheduleMergePolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "newest_wins" | "newest" => Some(Self::NewestWins),
            "keep_local_if_non_empty" | "keep_local" => Some(Self::KeepLocalIfNonEmpty),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period before a scheduled push fires.
    pub debounce: Duration,
    /// Bound on every backend, object store and feed call.
    pub request_timeout: Duration,
    pub policy: SyncPolicy,
    pub schedule_merge: ScheduleMergePolicy,
    /// Backoff between retries of a push that failed transiently.
    pub retry: ReconnectConfig,
    /// Retries after the first failed attempt; 0 disables retrying.
    pub max_push_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            policy: SyncPolicy::default(),
            schedule_merge: ScheduleMergePolicy::default(),
            retry: ReconnectConfig::default(),
            max_push_retries: DEFAULT_MAX_PUSH_RETRIES,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env var                     | Default       |
    /// |-----------------------------|---------------|
    /// | `SYNC_DEBOUNCE_MS`          | `600`         |
    /// | `SYNC_REQUEST_TIMEOUT_SECS` | `30`          |
    /// | `SYNC_POLICY`               | `automatic`   |
    /// | `SYNC_SCHEDULE_MERGE`       | `newest_wins` |
    /// | `SYNC_MAX_PUSH_RETRIES`     | `5`           |
    ///
    /// The debounce is clamped to 500–800 ms.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let debounce = match lookup("SYNC_DEBOUNCE_MS") {
            Some(v) => Duration::from_millis(parse_number("SYNC_DEBOUNCE_MS", &v)?),
            None => defaults.debounce,
        };
        let request_timeout = match lookup("SYNC_REQUEST_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("SYNC_REQUEST_TIMEOUT_SECS", &v)?),
            None => defaults.request_timeout,
        };
        let policy = match lookup("SYNC_POLICY") {
            Some(v) => SyncPolicy::from_name(&v).ok_or(ConfigError::Invalid {
                var: "SYNC_POLICY",
                value: v,
            })?,
            None => defaults.policy,
        };
        let schedule_merge = match lookup("SYNC_SCHEDULE_MERGE") {
            Some(v) => ScheduleMergePolicy::from_name(&v).ok_or(ConfigError::Invalid {
                var: "SYNC_SCHEDULE_MERGE",
                value: v,
            })?,
            None => defaults.schedule_merge,
        };
        let max_push_retries = match lookup("SYNC_MAX_PUSH_RETRIES") {
            Some(v) => parse_number("SYNC_MAX_PUSH_RETRIES", &v)?,
            None => defaults.max_push_retries,
        };

        Ok(Self {
            request_timeout,
            policy,
            schedule_merge,
            max_push_retries,
            ..defaults
        }
        .with_debounce(debounce))
    }

    /// Set the debounce, clamped to 500–800 ms.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce.clamp(MIN_DEBOUNCE, MAX_DEBOUNCE);
        self
    }

    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_schedule_merge(mut self, schedule_merge: ScheduleMergePolicy) -> Self {
        self.schedule_merge = schedule_merge;
        self
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.debounce, Duration::from_millis(600));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.policy, SyncPolicy::Automatic);
        assert_eq!(config.schedule_merge, ScheduleMergePolicy::NewestWins);
        assert_eq!(config.max_push_retries, 5);
    }

    #[test]
    fn debounce_is_clamped() {
        let fast = SyncConfig::from_lookup(lookup(&[("SYNC_DEBOUNCE_MS", "10")])).unwrap();
        assert_eq!(fast.debounce, MIN_DEBOUNCE);
        let slow = SyncConfig::from_lookup(lookup(&[("SYNC_DEBOUNCE_MS", "5000")])).unwrap();
        assert_eq!(slow.debounce, MAX_DEBOUNCE);
    }

    #[test]
    fn policies_parse_by_name() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("SYNC_POLICY", "Manual"),
            ("SYNC_SCHEDULE_MERGE", "keep_local_if_non_empty"),
        ]))
        .unwrap();
        assert_eq!(config.policy, SyncPolicy::Manual);
        assert_eq!(config.schedule_merge, ScheduleMergePolicy::KeepLocalIfNonEmpty);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = SyncConfig::from_lookup(lookup(&[("SYNC_REQUEST_TIMEOUT_SECS", "soon")]));
        assert!(matches!(
            err,
            Err(ConfigError::Invalid { var: "SYNC_REQUEST_TIMEOUT_SECS", .. })
        ));
        assert!(SyncConfig::from_lookup(lookup(&[("SYNC_POLICY", "sometimes")])).is_err());
    }
}

//! Agent configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use continuity_core::EntityId;
use continuity_sync::SyncConfig;

/// Default interval between backend reachability probes.
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum AgentConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error(transparent)]
    Sync(#[from] continuity_sync::config::ConfigError),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub database_url: String,
    pub realtime_ws_url: String,
    pub storage_url: String,
    pub storage_bucket: String,
    /// Sent as the realtime api key, the channel access token and the
    /// storage bearer token.
    pub access_token: Option<String>,
    pub project_id: EntityId,
    /// Presence identity of this client.
    pub client_name: String,
    pub state_file: PathBuf,
    pub photo_cache_dir: PathBuf,
    pub probe_interval: Duration,
    pub sync: SyncConfig,
}

impl AgentConfig {
    /// Read the configuration from the process environment.
    ///
    /// | Variable              | Required | Default                  |
    /// |-----------------------|----------|--------------------------|
    /// | `DATABASE_URL`        | yes      | --                       |
    /// | `REALTIME_WS_URL`     | yes      | --                       |
    /// | `STORAGE_URL`         | yes      | --                       |
    /// | `STORAGE_BUCKET`      | no       | `continuity`             |
    /// | `ACCESS_TOKEN`        | no       | --                       |
    /// | `PROJECT_ID`          | yes      | --                       |
    /// | `CLIENT_NAME`         | no       | `continuity-agent`       |
    /// | `STATE_FILE`          | no       | `continuity-state.json`  |
    /// | `PHOTO_CACHE_DIR`     | no       | `photo-cache`            |
    /// | `PROBE_INTERVAL_SECS` | no       | `10`                     |
    ///
    /// The `SYNC_*` variables are read by [`SyncConfig::from_env`].
    pub fn from_env() -> Result<Self, AgentConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AgentConfigError> {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(AgentConfigError::Missing(var))
        };

        let project_id = required("PROJECT_ID")?;
        let project_id = uuid::Uuid::parse_str(project_id.trim()).map_err(|_| {
            AgentConfigError::Invalid {
                var: "PROJECT_ID",
                value: project_id.clone(),
            }
        })?;

        let probe_interval = match lookup("PROBE_INTERVAL_SECS") {
            Some(v) => match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(AgentConfigError::Invalid {
                        var: "PROBE_INTERVAL_SECS",
                        value: v,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            realtime_ws_url: required("REALTIME_WS_URL")?,
            storage_url: required("STORAGE_URL")?,
            storage_bucket: lookup("STORAGE_BUCKET").unwrap_or_else(|| "continuity".into()),
            access_token: lookup("ACCESS_TOKEN").filter(|v| !v.is_empty()),
            project_id,
            client_name: lookup("CLIENT_NAME").unwrap_or_else(|| "continuity-agent".into()),
            state_file: lookup("STATE_FILE")
                .unwrap_or_else(|| "continuity-state.json".into())
                .into(),
            photo_cache_dir: lookup("PHOTO_CACHE_DIR")
                .unwrap_or_else(|| "photo-cache".into())
                .into(),
            probe_interval,
            sync: SyncConfig::from_lookup(&lookup)?,
        })
    }
}

//! Layered configuration for Hearth: built-in defaults, then an optional TOML
//! file, then `HEARTH__*` environment variables (`HEARTH__STORE__PATH`,
//! `HEARTH__LOGGING__LEVEL`, ...).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use hearth_core::{Roster, RosterMember};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const ENV_PREFIX: &str = "HEARTH";
const ENV_SEPARATOR: &str = "__";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HearthConfig {
    /// Scopes every stored collection, so several households can share a database.
    pub namespace: String,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub events: EventsConfig,
    pub reports: ReportsConfig,
    pub insight: InsightConfig,
    pub roster: Vec<RosterEntry>,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// When set, logs are also appended to this file.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventsConfig {
    pub capacity: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReportsConfig {
    /// Number of recent gym expenses shown on the gym summary.
    pub gym_recent: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct InsightConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl InsightConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gym: bool,
}

impl HearthConfig {
    /// Build the household roster, rejecting empty or duplicate entries.
    pub fn roster(&self) -> Result<Roster> {
        let members = self
            .roster
            .iter()
            .map(|entry| {
                let member = RosterMember::new(entry.id.trim(), entry.name.trim());
                if entry.gym {
                    member.with_gym()
                } else {
                    member
                }
            })
            .collect();
        Roster::new(members).context("invalid roster configuration")
    }

    /// Render the configuration as TOML, e.g. to seed a config file.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration as TOML")
    }
}

/// Load configuration from defaults, `path` (if any) and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<HearthConfig> {
    load_with_env(path, None)
}

/// Same as [`load_config`] but reads environment overrides from `env` instead of
/// the process environment when provided.
pub fn load_with_env(
    path: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<HearthConfig> {
    let mut builder =
        Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
    if let Some(path) = path {
        if !path.exists() {
            return Err(anyhow!("config file {} does not exist", path.display()));
        }
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env),
    );
    let config: HearthConfig = builder
        .build()
        .context("failed to assemble configuration")?
        .try_deserialize()
        .context("failed to parse configuration")?;
    config.roster()?;
    Ok(config)
}

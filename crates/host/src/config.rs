// crates/host/src/config.rs

//! Layered host configuration.
//!
//! Precedence (lowest to highest):
//! 1. Programmatic defaults
//! 2. `toolpref.yaml` in the working directory, or the file given with `--config`
//! 3. `TOOLPREF_*` environment variables, `__` separating nested keys
//!    (`TOOLPREF_SEARCH__POPULATION_SIZE=12`)
//! 4. Command-line overrides

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use toolpref_core::config::SearchConfig;
use toolpref_core::openai_client::ChatClientConfig;

pub const DEFAULT_CONFIG_FILE: &str = "toolpref.yaml";
pub const ENV_PREFIX: &str = "TOOLPREF_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Where inputs come from and results go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Service catalog: server -> tool -> strategy variants and competitors.
    pub catalog: PathBuf,
    pub queries: PathBuf,
    /// Only keep queries of this category (JSON query files).
    pub query_category: Option<String>,
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("tool_descriptions.json"),
            queries: PathBuf::from("queries.json"),
            query_category: None,
            output_dir: PathBuf::from("runs"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub search: SearchConfig,
    pub llm: ChatClientConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// Values given on the command line. Unset fields leave the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub seed: Option<u64>,
    pub generations: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl HostConfig {
    /// Load and validate. An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(HostConfig::default()));
        figment = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("config file {} not found", path.display());
                }
                figment.merge(Yaml::file(path))
            }
            None => figment.merge(Yaml::file(DEFAULT_CONFIG_FILE)),
        };

        let mut config: HostConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(seed) = overrides.seed {
            self.search.seed = seed;
        }
        if let Some(generations) = overrides.generations {
            self.search.max_generations = generations;
        }
        if let Some(dir) = &overrides.output_dir {
            self.paths.output_dir = dir.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.search.validate().context("invalid search configuration")?;
        crate::log::parse_level(&self.logging.level)?;
        if self.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model cannot be empty");
        }
        if self.llm.request_timeout_secs == 0 {
            anyhow::bail!("llm.request_timeout_secs must be at least 1");
        }
        Ok(())
    }
}

//! Configuration Loader
//!
//! Layers built-in defaults, an optional configuration file and
//! `FLOWSTART__`-prefixed environment variables, in that order of precedence.

use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::FlowStartConfig;

/// Files probed when no explicit path is given; the first that exists wins
const DEFAULT_CONFIG_FILES: &[&str] = &["config/flowstart.toml", "config/flowstart.yaml"];

const ENV_PREFIX: &str = "FLOWSTART";
const ENV_SEPARATOR: &str = "__";

impl FlowStartConfig {
    /// Load from the default locations and the process environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_environment(path, default_environment())
    }

    /// Load with an explicit environment source
    ///
    /// Tests pass `Environment::with_prefix(..).source(Some(map))` here instead of
    /// mutating process-wide variables.
    pub fn load_with_environment(
        path: Option<&Path>,
        environment: Environment,
    ) -> ConfigResult<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigurationError::ConfigFileNotFound {
                        path: path.to_path_buf(),
                    });
                }
                debug!(path = %path.display(), "Loading flow start configuration file");
                builder = builder.add_source(File::from(path.to_path_buf()));
            }
            None => {
                if let Some(found) = discover_config_file() {
                    debug!(path = %found.display(), "Discovered flow start configuration file");
                    builder = builder.add_source(File::from(found));
                }
            }
        }

        let config: FlowStartConfig = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(
            max_batch_size = config.dispatch.max_batch_size,
            direct_queue = %config.queues.direct,
            bulk_queue = %config.queues.bulk,
            worker_concurrency = config.worker.concurrency,
            "Flow start configuration loaded"
        );

        Ok(config)
    }
}

/// Environment source with the crate's prefix and nesting separator
pub fn default_environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

fn discover_config_file() -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

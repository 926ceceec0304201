//! CLI command implementations

pub mod error;
pub mod output;
pub mod query;
pub mod run;
pub mod tables;

use bronze_ingest::{config_dir, BronzeConfig, DEFAULT_NAMESPACE};
use clap::Args;
use std::path::PathBuf;

use crate::cli::error::HelpfulError;

/// Every source loaded.
pub const EXIT_SUCCESS: u8 = 0;
/// The run finished but at least one source failed.
pub const EXIT_PARTIAL_FAILURE: u8 = 1;
/// The run could not start or the command failed.
pub const EXIT_FAILURE: u8 = 2;

/// Store selection shared by every command.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Pipeline configuration file
    #[arg(short, long, default_value = "bronze.toml")]
    pub config: PathBuf,

    /// Landing store path (overrides [store].path)
    #[arg(long, env = "BRONZE_STORE")]
    pub store: Option<PathBuf>,

    /// Landing namespace (overrides [store].namespace)
    #[arg(long, env = "BRONZE_NAMESPACE")]
    pub namespace: Option<String>,
}

/// Store path and namespace after flags, environment and config file.
#[derive(Debug, Clone)]
pub struct StoreTarget {
    pub path: PathBuf,
    pub namespace: String,
}

impl StoreArgs {
    /// Resolve the store for read commands.
    ///
    /// The config file is consulted only for values not given on the command line.
    pub fn resolve(&self) -> anyhow::Result<StoreTarget> {
        if let (Some(path), Some(namespace)) = (&self.store, &self.namespace) {
            return Ok(StoreTarget {
                path: path.clone(),
                namespace: namespace.clone(),
            });
        }

        if !self.config.exists() {
            return match &self.store {
                Some(path) => Ok(StoreTarget {
                    path: path.clone(),
                    namespace: DEFAULT_NAMESPACE.to_string(),
                }),
                None => Err(HelpfulError::config_not_found(&self.config)
                    .with_suggestion("TRY: Or name the store directly: --store <path>")
                    .into()),
            };
        }

        let config = BronzeConfig::read(&self.config)
            .map_err(|e| HelpfulError::invalid_config(&self.config, &e.to_string()))?;
        let path = match &self.store {
            Some(path) => path.clone(),
            None => config
                .store_location(config_dir(&self.config))
                .map_err(|e| HelpfulError::invalid_config(&self.config, &e.to_string()))?,
        };
        let namespace = self
            .namespace
            .clone()
            .unwrap_or(config.store.namespace);

        Ok(StoreTarget { path, namespace })
    }
}

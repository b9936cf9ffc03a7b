pub mod connections;
pub mod health;
pub mod search;
pub mod stored;

use feedmerge_core::{Aggregator, AggregatorConfig, Credentials};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::cli::{Cli, OutputFormat};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] feedmerge_core::ConfigError),

    #[error("{0}")]
    Search(#[from] feedmerge_core::AggregatorError),

    #[error("Client setup failed: {0}")]
    Client(#[from] feedmerge_core::FetchError),

    #[error("Result store error: {0}")]
    Store(#[from] feedmerge_core::StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Config file (if any), environment overrides, then `--offline`.
pub fn load_config(cli: &Cli) -> Result<AggregatorConfig> {
    let mut config = AggregatorConfig::resolve(cli.config.as_deref())?;
    if cli.offline {
        config.offline = true;
    }
    Ok(config)
}

pub fn build_aggregator(config: &AggregatorConfig) -> Result<Aggregator> {
    Ok(Aggregator::from_config(config, &Credentials::from_env())?)
}

/// For commands that never search: no persistence consumer.
pub fn build_status_aggregator(config: &AggregatorConfig) -> Result<Aggregator> {
    build_aggregator(&without_persistence(config))
}

fn without_persistence(config: &AggregatorConfig) -> AggregatorConfig {
    let mut config = config.clone();
    config.persistence.enabled = false;
    config
}

/// Spinner for pretty output only; machine-readable formats stay clean.
pub fn spinner(cli: &Cli, message: String) -> Option<ProgressBar> {
    if cli.output != OutputFormat::Pretty {
        return None;
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    Some(spinner)
}

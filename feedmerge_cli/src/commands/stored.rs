use feedmerge_core::{FileResultStore, ResultStore};

use crate::cli::Cli;
use crate::commands::{load_config, Result};
use crate::output::{format_output, OutputData};

pub async fn run(cli: &Cli, limit: usize) -> Result<()> {
    let config = load_config(cli)?;
    let store = match &config.persistence.path {
        Some(path) => FileResultStore::new(path),
        None => FileResultStore::new_default(),
    };

    let mut results = store.load_all()?;
    let total = results.len();
    results.truncate(limit);

    format_output(
        &OutputData::StoredResults {
            path: store.path().display().to_string(),
            total,
            results,
        },
        &cli.output,
    )
}

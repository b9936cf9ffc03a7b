use crate::cli::OutputFormat;
use crate::commands::Result;
use feedmerge_core::{
    AggregateResponse, ConnectionReport, HealthReport, ResponseOrigin, StoredResult,
};
use serde::{Deserialize, Serialize};

mod pretty;
pub use pretty::format_pretty_output;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutputData {
    SearchResults {
        response: AggregateResponse,
        origin: ResponseOrigin,
    },
    Health(HealthReport),
    Connections(Vec<ConnectionReport>),
    StoredResults {
        path: String,
        total: usize,
        results: Vec<StoredResult>,
    },
}

pub fn format_output(data: &OutputData, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(data)?);
        }
        OutputFormat::Text => {
            format_text_output(data);
        }
        OutputFormat::Pretty => {
            print!("{}", format_pretty_output(data));
        }
    }
    Ok(())
}

/// Tab-separated, one record per line.
fn format_text_output(data: &OutputData) {
    match data {
        OutputData::SearchResults { response, .. } => {
            for r in &response.results {
                println!(
                    "{}\t{}\t{}\t{}",
                    r.published_at.to_rfc3339(),
                    r.source,
                    r.title,
                    r.url
                );
            }
        }
        OutputData::Health(report) => {
            println!("status\t{}", report.status);
            println!("offline\t{}", report.offline);
            for (source, status) in &report.services {
                println!("{}\t{:?}", source, status);
            }
        }
        OutputData::Connections(reports) => {
            for r in reports {
                println!(
                    "{}\t{:?}\t{}ms\t{}",
                    r.service,
                    r.status,
                    r.response_time_ms,
                    r.error.as_deref().unwrap_or("-")
                );
            }
        }
        OutputData::StoredResults { results, .. } => {
            for s in results {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    s.result.published_at.to_rfc3339(),
                    s.result.source,
                    s.query,
                    s.result.title,
                    s.result.url
                );
            }
        }
    }
}

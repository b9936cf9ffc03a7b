//! Pretty formatter for terminal output.
//!
//! Results render as numbered cards: bold title, source tag, link, a dimmed
//! snippet and an engagement line. Status views render as tables.

use std::collections::BTreeMap;

use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table,
};
use feedmerge_core::{
    AggregateResponse, CanonicalResult, ConnectionReport, ConnectionStatus, HealthReport,
    MetricValue, ResponseOrigin, ServiceStatus, StoredResult,
};
use owo_colors::OwoColorize;

use super::OutputData;

/// Terminal width for formatting (default fallback)
const DEFAULT_WIDTH: usize = 80;

/// Indent for card content (after number)
const CARD_INDENT: usize = 6;

pub fn format_pretty_output(data: &OutputData) -> String {
    let width = terminal_width();
    match data {
        OutputData::SearchResults { response, origin } => format_search(response, *origin, width),
        OutputData::Health(report) => format_health(report, width),
        OutputData::Connections(reports) => format_connections(reports, width),
        OutputData::StoredResults {
            path,
            total,
            results,
        } => format_stored(path, *total, results, width),
    }
}

// ============================================================================
// Search results
// ============================================================================

fn format_search(response: &AggregateResponse, origin: ResponseOrigin, width: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {}\n",
        "Search:".bold().cyan(),
        response.query.yellow()
    ));
    let sources: Vec<&str> = response.sources.iter().map(|s| s.display_name()).collect();
    out.push_str(&format!("{} {}\n\n", "Sources:".dimmed(), sources.join(", ").green()));

    out.push_str(&format_section_header(
        "Results",
        Some(response.total_results),
        width,
    ));
    out.push('\n');

    if response.results.is_empty() {
        out.push_str(&format!("   {}\n\n", "No results".dimmed()));
    }
    for (i, result) in response.results.iter().enumerate() {
        out.push_str(&format_card(result, i + 1, width));
    }

    let served = match origin {
        ResponseOrigin::Cache => "served from cache",
        ResponseOrigin::Fresh => "fresh",
    };
    out.push_str(&format!(
        "{}\n",
        format!(
            "Retrieved {} ({}, cached for {}s)",
            response.metadata.retrieved_at.format("%Y-%m-%d %H:%M:%S UTC"),
            served,
            response.metadata.cache_ttl_secs
        )
        .dimmed()
    ));
    out
}

fn format_card(result: &CanonicalResult, index: usize, width: usize) -> String {
    let indent = " ".repeat(CARD_INDENT);
    let text_width = width.saturating_sub(CARD_INDENT + 2).max(40);
    let mut out = String::new();

    out.push_str(&format!(
        " {:>3}. {} {}\n",
        index.to_string().cyan().bold(),
        truncate_str(&result.title, text_width.saturating_sub(12)).bold(),
        format!("[{}]", result.source).dimmed()
    ));
    out.push_str(&format!("{}{}\n", indent, result.url.blue()));

    let snippet = truncate_str(&clean_snippet(&result.description), text_width);
    if !snippet.is_empty() {
        out.push_str(&format!("{}{}\n", indent, snippet.dimmed()));
    }

    let mut meta = vec![result.published_at.format("%Y-%m-%d %H:%M").to_string()];
    if let Some(author) = &result.author {
        meta.push(author.clone());
    }
    if let Some(category) = &result.category {
        meta.push(category.clone());
    }
    let metrics = format_metrics(&result.engagement);
    if !metrics.is_empty() {
        meta.push(metrics);
    }
    out.push_str(&format!("{}{}\n\n", indent, meta.join(" · ").dimmed()));
    out
}

/// `views 45200 · likes 1240`, skipping zero counters.
fn format_metrics(engagement: &BTreeMap<String, MetricValue>) -> String {
    engagement
        .iter()
        .filter(|(_, v)| v.as_f64() != 0.0)
        .map(|(k, v)| format!("{} {}", k, v))
        .collect::<Vec<_>>()
        .join(" · ")
}

// ============================================================================
// Status views
// ============================================================================

fn format_health(report: &HealthReport, width: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {}\n",
        "Status:".bold().cyan(),
        report.status.green().bold()
    ));
    if report.offline {
        out.push_str(&format!("{}\n", "Offline mode: fixed payloads, no network".yellow()));
    }
    out.push('\n');

    let mut table = new_table(width);
    table.set_header(vec![
        Cell::new("Source".cyan().bold().to_string()),
        Cell::new("Credentials".cyan().bold().to_string()),
    ]);
    for (source, status) in &report.services {
        let status = match status {
            ServiceStatus::Configured => "configured".green().to_string(),
            ServiceStatus::NotConfigured => "not configured".yellow().to_string(),
        };
        table.add_row(vec![Cell::new(source.display_name()), Cell::new(status)]);
    }
    out.push_str(&format!("{}\n", table));
    out
}

fn format_connections(reports: &[ConnectionReport], width: usize) -> String {
    let mut table = new_table(width);
    table.set_header(vec![
        Cell::new("Source".cyan().bold().to_string()),
        Cell::new("Status".cyan().bold().to_string()),
        Cell::new("Time".cyan().bold().to_string()),
        Cell::new("Error".cyan().bold().to_string()),
    ]);
    for r in reports {
        let status = match r.status {
            ConnectionStatus::Success => "ok".green().to_string(),
            ConnectionStatus::Error => "error".red().to_string(),
            ConnectionStatus::Timeout => "timeout".yellow().to_string(),
        };
        table.add_row(vec![
            Cell::new(r.service.display_name()),
            Cell::new(status),
            Cell::new(format!("{}ms", r.response_time_ms)),
            Cell::new(truncate_str(r.error.as_deref().unwrap_or("-"), 60)),
        ]);
    }
    format!("{}\n", table)
}

fn format_stored(path: &str, total: usize, results: &[StoredResult], width: usize) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n\n", "Store:".dimmed(), path));
    if results.is_empty() {
        out.push_str(&format!("{}\n", "Nothing stored yet".dimmed()));
        return out;
    }

    let mut table = new_table(width);
    table.set_header(vec![
        Cell::new("Published".cyan().bold().to_string()),
        Cell::new("Source".cyan().bold().to_string()),
        Cell::new("Title".cyan().bold().to_string()),
        Cell::new("Query".cyan().bold().to_string()),
    ]);
    for s in results {
        table.add_row(vec![
            Cell::new(s.result.published_at.format("%Y-%m-%d").to_string()),
            Cell::new(s.result.source.as_str()),
            Cell::new(truncate_str(&s.result.title, 50)),
            Cell::new(truncate_str(&s.query, 30)),
        ]);
    }
    out.push_str(&format!("{}\n", table));
    if total > results.len() {
        out.push_str(&format!(
            "{}\n",
            format!("... and {} more", total - results.len()).dimmed()
        ));
    }
    out
}

// ============================================================================
// Utility Functions
// ============================================================================

fn new_table(width: usize) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(width.min(u16::MAX as usize) as u16);
    table
}

fn format_section_header(title: &str, count: Option<usize>, width: usize) -> String {
    let header = match count {
        Some(n) => format!("{} ({})", title, n),
        None => title.to_string(),
    };
    let line_len = width.saturating_sub(header.len() + 6).min(60);
    format!(
        "{} {} {}\n",
        "──".cyan(),
        header.green().bold(),
        "─".repeat(line_len).cyan()
    )
}

fn truncate_str(s: &str, max_len: usize) -> String {
    // Take first line only
    let first_line = s.lines().next().unwrap_or(s);

    if first_line.chars().count() <= max_len {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn clean_snippet(s: &str) -> String {
    s.replace('\n', " ")
        .replace('\r', "")
        .replace("  ", " ")
        .trim()
        .to_string()
}

fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(DEFAULT_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use feedmerge_core::SourceId;

    fn result() -> CanonicalResult {
        CanonicalResult::new(
            "mock-video-1",
            SourceId::Video,
            "Complete Tutorial",
            "https://youtube.com/watch?v=mock-video-1",
            chrono::Utc.with_ymd_and_hms(2025, 1, 17, 12, 0, 0).unwrap(),
        )
        .with_description("line one\nline two")
        .with_metric("views", 45200i64)
        .with_metric("likes", 0i64)
    }

    #[test]
    fn test_format_card() {
        let output = format_card(&result(), 1, 80);
        assert!(output.contains("Complete Tutorial"));
        assert!(output.contains("youtube.com/watch?v=mock-video-1"));
        assert!(output.contains("line one line two"));
        assert!(output.contains("views 45200"));
        assert!(!output.contains("likes"));
    }

    #[test]
    fn test_format_health_lists_sources() {
        let report = HealthReport {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
            offline: true,
            services: [
                (SourceId::News, ServiceStatus::Configured),
                (SourceId::Social, ServiceStatus::NotConfigured),
            ]
            .into_iter()
            .collect(),
            cache: feedmerge_core::CacheStats {
                entries: 0,
                capacity: 1000,
                ttl_secs: 3600,
                hits: 0,
                misses: 0,
            },
            persistence: None,
        };
        let output = format_health(&report, 80);
        assert!(output.contains("Google News"));
        assert!(output.contains("not configured"));
        assert!(output.contains("Offline mode"));
        assert!(!output.contains("Cache:"));
    }

    #[test]
    fn test_truncate_str() {
        let long = "This is a very long string that should be truncated";
        let truncated = truncate_str(long, 20);
        assert!(truncated.ends_with("..."));
        assert!(truncated.chars().count() <= 20);
    }

    #[test]
    fn test_format_section_header() {
        let header = format_section_header("Results", Some(10), 80);
        assert!(header.contains("Results"));
        assert!(header.contains("10"));
    }
}

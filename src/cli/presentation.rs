//! CLI presentation: text and json formatters per command.

use crate::cache::StoredSummary;
use crate::config::{ServiceConfig, TabsumConfig};
use crate::error::PipelineError;
use crate::generation::Availability;
use crate::query::QueryOutcome;
use crate::registry::{EntryState, TabEntry};
use crate::tabs::TabId;
use chrono::{TimeZone, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::{ContentArrangement, Table};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value).map_err(|e| PipelineError::OutputEncoding(e.to_string()))
}

fn section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn state_label(state: &EntryState) -> String {
    match state {
        EntryState::Done => "cached".green().to_string(),
        EntryState::Persisted => "summarized".green().to_string(),
        EntryState::Failed { .. } => "failed".red().to_string(),
        EntryState::Removed => "removed".dimmed().to_string(),
        EntryState::Summarizing { chunks } => format!("summarizing {} chunks", chunks).yellow().to_string(),
        EntryState::Merging { fragments } => format!("merging {} fragments", fragments).yellow().to_string(),
        other if other.is_working() => format!("{:?}", other).yellow().to_string(),
        other => format!("{:?}", other),
    }
}

pub fn format_status_text(
    service: &ServiceConfig,
    result: &Result<Availability, PipelineError>,
) -> String {
    let mut out = section_heading("Generation service");
    out.push('\n');
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.add_row(vec!["Endpoint", service.endpoint.as_str()]);
    table.add_row(vec!["Model", service.model.as_str()]);
    let status = match result {
        Ok(availability) => availability.to_string().green().to_string(),
        Err(e) => format!("unavailable ({})", e).red().to_string(),
    };
    table.add_row(vec!["Capability".to_string(), status]);
    out.push_str(&table.to_string());
    out
}

pub fn format_status_json(
    service: &ServiceConfig,
    result: &Result<Availability, PipelineError>,
) -> Result<String, PipelineError> {
    let (availability, error) = match result {
        Ok(availability) => (*availability, None),
        Err(e) => (Availability::Unavailable, Some(e.to_string())),
    };
    to_json(&json!({
        "endpoint": service.endpoint,
        "model": service.model,
        "availability": availability,
        "error": error,
    }))
}

/// Serializable snapshot of one entry
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub tab_id: TabId,
    pub title: String,
    pub url: String,
    pub state: EntryState,
    pub fragments: Vec<String>,
}

impl From<&TabEntry> for EntryView {
    fn from(entry: &TabEntry) -> Self {
        Self {
            tab_id: entry.id(),
            title: entry.title().to_string(),
            url: entry.url().to_string(),
            state: entry.state(),
            fragments: entry
                .summary()
                .map(|s| s.fragments().to_vec())
                .unwrap_or_default(),
        }
    }
}

pub fn format_entries_text(entries: &[Arc<TabEntry>], active: Option<TabId>) -> String {
    if entries.is_empty() {
        return "No trackable tabs.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Tab", "Title", "State", "Summary"]);
    for entry in entries {
        let marker = if Some(entry.id()) == active { "*" } else { "" };
        let summary = entry.summary().map(|s| s.text()).unwrap_or_default();
        table.add_row(vec![
            format!("{}{}", entry.id(), marker),
            entry.tab().display_title(),
            state_label(&entry.state()),
            summary,
        ]);
    }
    let mut out = section_heading("Tab summaries");
    out.push('\n');
    out.push_str(&table.to_string());
    out.push_str(&format!("\nTotal: {} tab(s)", entries.len()));
    out
}

pub fn format_entries_json(entries: &[Arc<TabEntry>]) -> Result<String, PipelineError> {
    let views: Vec<EntryView> = entries.iter().map(|e| EntryView::from(e.as_ref())).collect();
    to_json(&views)
}

pub fn format_query_text(outcome: &QueryOutcome) -> String {
    let mut out = section_heading(&format!("Question: {}", outcome.question));
    out.push('\n');
    let relevant: Vec<_> = outcome.relevant().collect();
    if relevant.is_empty() {
        out.push_str("No open tab answers this question.");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Tab", "Title", "Answer"]);
        for answer in &relevant {
            let title: String = answer.title.chars().take(crate::tabs::TITLE_DISPLAY_CHARS).collect();
            table.add_row(vec![
                answer.tab_id.to_string(),
                title,
                answer.answer.clone().unwrap_or_default(),
            ]);
        }
        out.push_str(&table.to_string());
    }

    let failed: Vec<_> = outcome.answers.iter().filter(|a| a.error.is_some()).collect();
    if !failed.is_empty() {
        out.push_str(&format!("\n\n{}", format!("{} tab(s) could not be asked:", failed.len()).yellow()));
        for answer in failed {
            out.push_str(&format!(
                "\n  - {} ({})",
                answer.url,
                answer.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    out
}

pub fn format_query_json(outcome: &QueryOutcome) -> Result<String, PipelineError> {
    to_json(outcome)
}

pub fn format_cached_summary_text(url: &str, stored: Option<&StoredSummary>) -> String {
    match stored {
        None => format!("No cached summary for {}", url),
        Some(stored) => {
            let stored_at = Utc
                .timestamp_millis_opt(stored.stored_at)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            let mut out = format!("{}\nStored: {}\n\n", section_heading(url), stored_at);
            out.push_str(&crate::chunking::join_fragments(&stored.fragments));
            out
        }
    }
}

pub fn format_cached_summary_json(
    url: &str,
    stored: Option<&StoredSummary>,
) -> Result<String, PipelineError> {
    to_json(&json!({
        "url": url,
        "cached": stored.is_some(),
        "fragments": stored.map(|s| s.fragments.clone()),
        "stored_at": stored.map(|s| s.stored_at),
    }))
}

pub fn format_config_toml(config: &TabsumConfig) -> Result<String, PipelineError> {
    toml::to_string_pretty(config).map_err(|e| PipelineError::OutputEncoding(e.to_string()))
}

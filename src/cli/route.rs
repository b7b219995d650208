//! CLI route: single route table and run context. Dispatches to the registry,
//! query engine, and presentation.

use crate::cache::{SledSummaryCache, SummaryCache};
use crate::cli::help::command_name;
use crate::cli::parse::{CacheCommands, Commands};
use crate::cli::presentation::{
    format_cached_summary_json, format_cached_summary_text, format_config_toml,
    format_entries_json, format_entries_text, format_query_json, format_query_text,
    format_status_json, format_status_text,
};
use crate::config::{ConfigLoader, TabsumConfig};
use crate::content::{ContentSource, HttpContentSource};
use crate::error::PipelineError;
use crate::generation::{GenerationService, OllamaService};
use crate::pipeline::Pipeline;
use crate::query::QueryEngine;
use crate::registry::TabSummaryRegistry;
use crate::tabs::{TabEvent, TabInfo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runtime context for CLI execution: loaded config and the wired pipeline.
pub struct RunContext {
    config: TabsumConfig,
    pipeline: Arc<Pipeline>,
}

impl RunContext {
    /// Load config and wire the pipeline. Must be called inside a tokio runtime.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };

        let service: Arc<dyn GenerationService> = Arc::new(OllamaService::new(&config.service)?);
        let cache: Arc<dyn SummaryCache> =
            Arc::new(SledSummaryCache::open(&config.storage.cache_path)?);
        let content: Arc<dyn ContentSource> = Arc::new(HttpContentSource::new()?);

        let pipeline = Pipeline::new(config.clone(), service, cache, content);
        Ok(Self { config, pipeline })
    }

    /// Build a run context around an existing pipeline.
    pub fn with_pipeline(pipeline: Arc<Pipeline>) -> Self {
        Self {
            config: pipeline.config().clone(),
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Execute a CLI command via the single route table.
    pub async fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        let started = Instant::now();
        let name = command_name(command);
        let result = self.execute_inner(command).await;
        match &result {
            Ok(_) => info!(
                command = %name,
                duration_ms = started.elapsed().as_millis(),
                "Command completed"
            ),
            Err(e) => warn!(
                command = %name,
                duration_ms = started.elapsed().as_millis(),
                error = %e,
                "Command failed"
            ),
        }
        result
    }

    async fn execute_inner(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Status { format } => {
                let result = self.pipeline.negotiate().await;
                if format == "json" {
                    format_status_json(&self.config.service, &result)
                } else {
                    Ok(format_status_text(&self.config.service, &result))
                }
            }
            Commands::Summarize { tabs, format } => {
                let registry = self.summarize_tabs(tabs).await?;
                let entries = registry.entries();
                if format == "json" {
                    format_entries_json(&entries)
                } else {
                    Ok(format_entries_text(&entries, registry.active()))
                }
            }
            Commands::Ask {
                tabs,
                question,
                format,
            } => {
                let registry = self.summarize_tabs(tabs).await?;
                let engine = QueryEngine::new(Arc::clone(&self.pipeline));
                let outcome = engine.ask(question, &registry).await?;
                if format == "json" {
                    format_query_json(&outcome)
                } else {
                    Ok(format_query_text(&outcome))
                }
            }
            Commands::Cache { command } => self.handle_cache_command(command).await,
            Commands::Config => format_config_toml(&self.config),
        }
    }

    async fn handle_cache_command(&self, command: &CacheCommands) -> Result<String, PipelineError> {
        match command {
            CacheCommands::Get { url, format } => {
                url::Url::parse(url).map_err(|e| PipelineError::InvalidUrl(format!("{}: {}", url, e)))?;
                let stored = self.pipeline.cache().get(url).await?;
                if format == "json" {
                    format_cached_summary_json(url, stored.as_ref())
                } else {
                    Ok(format_cached_summary_text(url, stored.as_ref()))
                }
            }
        }
    }

    /// Negotiate, register every tab from the snapshot, and wait for all runs.
    async fn summarize_tabs(&self, path: &Path) -> Result<Arc<TabSummaryRegistry>, PipelineError> {
        let tabs = load_tabs(path)?;
        self.pipeline.negotiate().await?;

        let registry = Arc::new(TabSummaryRegistry::new(Arc::clone(&self.pipeline)));
        let mut handles = Vec::new();
        for tab in tabs {
            if let Some(handle) = registry.handle_event(TabEvent::Updated(tab))? {
                handles.push(handle);
            }
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Summarization task ended abnormally");
            }
        }

        Ok(registry)
    }
}

/// Read a JSON array of tabs.
pub fn load_tabs(path: &Path) -> Result<Vec<TabInfo>, PipelineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::InvalidInput(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| PipelineError::InvalidInput(format!("{}: {}", path.display(), e)))
}

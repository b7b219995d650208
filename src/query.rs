//! Ask loop over resolved tab summaries.
//!
//! One base session carries the relevance instruction. Every entry is asked
//! through its own fork of that session, strictly one after another, and each
//! fork is released before the next is created.

use crate::error::PipelineError;
use crate::events::PipelineEvent;
use crate::generation::{SessionOptions, SharedSession};
use crate::pipeline::Pipeline;
use crate::registry::{TabEntry, TabSummaryRegistry};
use crate::tabs::TabId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryAnswer {
    pub tab_id: TabId,
    pub title: String,
    pub url: String,
    pub relevant: bool,
    /// Text after the relevance token; only set when relevant
    pub answer: Option<String>,
    /// Prompt failure for this entry, if any
    pub error: Option<String>,
}

/// Result of one `ask` call, in registry iteration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryOutcome {
    pub question: String,
    pub answers: Vec<QueryAnswer>,
}

impl QueryOutcome {
    pub fn relevant(&self) -> impl Iterator<Item = &QueryAnswer> {
        self.answers.iter().filter(|a| a.relevant)
    }
}

/// Owns a session until released. Dropping an unreleased guard still destroys
/// the session on the current runtime.
struct SessionGuard {
    session: Option<SharedSession>,
}

impl SessionGuard {
    fn new(session: SharedSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn session(&self) -> Option<&SharedSession> {
        self.session.as_ref()
    }

    async fn release(mut self) {
        if let Some(session) = self.session.take() {
            session.destroy().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { session.destroy().await });
            }
        }
    }
}

/// If `response` starts with `token` as a whole word (after trimming), return
/// the remainder as the answer.
pub fn parse_relevance(response: &str, token: &str) -> Option<String> {
    let rest = response.trim().strip_prefix(token)?;
    if rest.starts_with(|c: char| c.is_alphanumeric()) {
        return None;
    }
    let answer =
        rest.trim_start_matches(|c: char| matches!(c, ':' | ',' | '.') || c.is_whitespace());
    Some(answer.trim_end().to_string())
}

fn build_prompt(entry: &TabEntry, question: &str) -> String {
    let summary = entry.summary().map(|s| s.text()).unwrap_or_default();
    format!(
        "Title: {}\n\nSummary:\n{}\n\nQuestion: {}",
        entry.title(),
        summary,
        question
    )
}

pub struct QueryEngine {
    pipeline: Arc<Pipeline>,
}

impl QueryEngine {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Ask `question` against every resolved entry of `registry`.
    pub async fn ask(
        &self,
        question: &str,
        registry: &TabSummaryRegistry,
    ) -> Result<QueryOutcome, PipelineError> {
        let entries = registry.resolved_entries();
        self.ask_entries(question, &entries).await
    }

    /// Ask `question` against `entries`, visiting them in the given order.
    ///
    /// Fails only when the pipeline is not ready or the base session cannot be
    /// created. Per-entry prompt failures are reported in the answer.
    pub async fn ask_entries(
        &self,
        question: &str,
        entries: &[Arc<TabEntry>],
    ) -> Result<QueryOutcome, PipelineError> {
        self.pipeline.ensure_ready()?;

        let query_config = &self.pipeline.config().query;
        let start = Instant::now();
        let base = self
            .pipeline
            .service()
            .create_session(SessionOptions::prompt(query_config.instruction.clone()), None)
            .await?;
        let base = SessionGuard::new(base);

        let mut answers = Vec::with_capacity(entries.len());
        for entry in entries {
            let answer = match base.session() {
                Some(session) => self.ask_one(session, entry, question).await,
                None => break,
            };
            self.pipeline.events().emit(PipelineEvent::QueryAnswered {
                tab_id: answer.tab_id,
                relevant: answer.relevant,
            });
            answers.push(answer);
        }

        base.release().await;

        let relevant = answers.iter().filter(|a| a.relevant).count();
        info!(
            entries = answers.len(),
            relevant,
            duration_ms = start.elapsed().as_millis(),
            "Query answered"
        );

        Ok(QueryOutcome {
            question: question.to_string(),
            answers,
        })
    }

    async fn ask_one(&self, base: &SharedSession, entry: &TabEntry, question: &str) -> QueryAnswer {
        let token = &self.pipeline.config().query.relevance_token;
        let mut answer = QueryAnswer {
            tab_id: entry.id(),
            title: entry.title().to_string(),
            url: entry.url().to_string(),
            relevant: false,
            answer: None,
            error: None,
        };

        let fork = match base.fork().await {
            Ok(fork) => SessionGuard::new(fork),
            Err(e) => {
                warn!(tab_id = %entry.id(), error = %e, "Could not fork query session");
                answer.error = Some(e.to_string());
                return answer;
            }
        };

        let result = match fork.session() {
            Some(session) => session.prompt(&build_prompt(entry, question)).await,
            None => Err(PipelineError::SessionDisposed),
        };
        fork.release().await;

        match result {
            Ok(response) => match parse_relevance(&response, token) {
                Some(text) => {
                    debug!(tab_id = %entry.id(), "Entry is relevant");
                    answer.relevant = true;
                    answer.answer = Some(text);
                }
                None => debug!(tab_id = %entry.id(), "Entry is not relevant"),
            },
            Err(e) => {
                warn!(tab_id = %entry.id(), url = %entry.url(), error = %e, "Query prompt failed");
                answer.error = Some(e.to_string());
            }
        }
        answer
    }
}

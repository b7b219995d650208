//! Integration tests for the Query Engine
//!
//! Tests cover:
//! - One fork per entry, every fork and the base session disposed
//! - Prompt failures contained per entry
//! - Relevance parsing and registry ordering

use crate::integration::test_utils::{FakeContent, FakeService, Harness, RecordingCache, SessionKind};
use std::sync::Arc;
use tabsum::config::TabsumConfig;
use tabsum::error::PipelineError;
use tabsum::events::PipelineEvent;
use tabsum::query::QueryEngine;
use tabsum::registry::TabSummaryRegistry;
use tabsum::tabs::{TabId, TabInfo};

async fn seeded_registry(harness: &Harness) -> TabSummaryRegistry {
    let tabs = [
        (1u64, "https://rust.example/", "Rust", "cached rust"),
        (2, "https://food.example/", "Cooking", "cached food"),
        (3, "https://broken.example/", "Broken", "cached broken"),
    ];
    for (_, url, _, summary) in &tabs {
        harness.cache.seed(url, vec![*summary]).await;
    }
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));
    for (id, url, title, _) in &tabs {
        registry
            .refresh(TabInfo::new(*id, *url, *title))
            .await
            .unwrap();
    }
    registry
}

fn responder(prompt: &str) -> Result<String, PipelineError> {
    if prompt.starts_with("Title: Rust") {
        Ok("YES\nRust is a systems language.".to_string())
    } else if prompt.starts_with("Title: Broken") {
        Err(PipelineError::Generation("scripted prompt failure".to_string()))
    } else {
        Ok("NO".to_string())
    }
}

#[tokio::test]
async fn test_ask_forks_and_disposes_every_session() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new().with_prompt_responder(responder),
        FakeContent::new(),
        RecordingCache::new(),
    )
    .await;
    let registry = seeded_registry(&harness).await;
    let engine = QueryEngine::new(Arc::clone(&harness.pipeline));

    let outcome = engine.ask("what is rust?", &registry).await.unwrap();

    let state = &harness.service.state;
    assert_eq!(state.created_count(SessionKind::Prompt), 1);
    assert_eq!(state.created_count(SessionKind::Fork), 3);
    assert_eq!(state.destroyed_count(SessionKind::Fork), 3);
    assert_eq!(state.destroyed_count(SessionKind::Prompt), 1);

    // Registry order: titles sorted case-insensitively.
    let titles: Vec<&str> = outcome.answers.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["Broken", "Cooking", "Rust"]);

    let relevant: Vec<_> = outcome.relevant().collect();
    assert_eq!(relevant.len(), 1);
    assert_eq!(relevant[0].tab_id, TabId(1));
    assert_eq!(
        relevant[0].answer.as_deref(),
        Some("Rust is a systems language.")
    );

    let broken = &outcome.answers[0];
    assert!(!broken.relevant);
    assert!(broken.error.as_deref().unwrap().contains("scripted prompt failure"));
    assert!(outcome.answers[1].error.is_none());
}

#[tokio::test]
async fn test_prompt_carries_title_summary_and_question() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new().with_prompt_responder(responder),
        FakeContent::new(),
        RecordingCache::new(),
    )
    .await;
    let registry = seeded_registry(&harness).await;
    let engine = QueryEngine::new(Arc::clone(&harness.pipeline));

    engine.ask("what is rust?", &registry).await.unwrap();

    let prompts = harness.service.state.prompts.lock().clone();
    assert_eq!(prompts.len(), 3);
    assert_eq!(
        prompts[2],
        "Title: Rust\n\nSummary:\ncached rust\n\nQuestion: what is rust?"
    );

    let created = harness.service.state.created.lock();
    let (_, base_options) = created
        .iter()
        .find(|(kind, _)| *kind == SessionKind::Prompt)
        .unwrap();
    assert_eq!(
        base_options.instruction.as_deref(),
        Some(TabsumConfig::default().query.instruction.as_str())
    );
}

#[tokio::test]
async fn test_unresolved_entries_are_not_asked() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new().with_prompt_responder(responder),
        FakeContent::new(),
        RecordingCache::new(),
    )
    .await;
    let registry = seeded_registry(&harness).await;
    registry
        .track(TabInfo::new(9, "https://pending.example/", "Pending"))
        .unwrap();
    let engine = QueryEngine::new(Arc::clone(&harness.pipeline));

    let outcome = engine.ask("anything", &registry).await.unwrap();

    assert_eq!(outcome.answers.len(), 3);
    assert!(outcome.answers.iter().all(|a| a.tab_id != TabId(9)));
    assert_eq!(harness.service.state.created_count(SessionKind::Fork), 3);
}

#[tokio::test]
async fn test_ask_with_no_entries_still_disposes_base() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new(),
        RecordingCache::new(),
    )
    .await;
    let engine = QueryEngine::new(Arc::clone(&harness.pipeline));

    let outcome = engine.ask_entries("anything", &[]).await.unwrap();

    assert!(outcome.answers.is_empty());
    assert_eq!(harness.service.state.created_count(SessionKind::Prompt), 1);
    assert_eq!(harness.service.state.destroyed_count(SessionKind::Prompt), 1);
}

#[tokio::test]
async fn test_query_answers_are_published() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new().with_prompt_responder(responder),
        FakeContent::new(),
        RecordingCache::new(),
    )
    .await;
    let registry = seeded_registry(&harness).await;
    let engine = QueryEngine::new(Arc::clone(&harness.pipeline));
    let mut events = harness.pipeline.events().subscribe();

    engine.ask("what is rust?", &registry).await.unwrap();

    let mut answered = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::QueryAnswered { tab_id, relevant } = event {
            answered.push((tab_id.0, relevant));
        }
    }
    assert_eq!(answered, vec![(3, false), (2, false), (1, true)]);
}

#[tokio::test]
async fn test_ask_requires_ready_service() {
    let harness = Harness::build(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new(),
        RecordingCache::new(),
    );
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));
    let engine = QueryEngine::new(Arc::clone(&harness.pipeline));

    let result = engine.ask("anything", &registry).await;

    assert!(matches!(result, Err(PipelineError::NotReady(_))));
    assert!(harness.service.state.created.lock().is_empty());
}

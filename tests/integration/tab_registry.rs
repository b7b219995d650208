//! Integration tests for the Tab Summary Registry
//!
//! Tests cover:
//! - Cache-hit idempotence and write-once persistence
//! - Chunk order under out-of-order latency
//! - Merge threshold
//! - Navigation, removal, and ordering of entries

use crate::integration::test_utils::{
    summary_for, text_of, FakeContent, FakeService, Harness, RecordingCache, SessionKind,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tabsum::config::TabsumConfig;
use tabsum::error::PipelineError;
use tabsum::events::PipelineEvent;
use tabsum::registry::{EntryState, TabSummaryRegistry};
use tabsum::tabs::{TabEvent, TabId, TabInfo};

const POST: &str = "https://a.example/post";

fn tab(id: u64, url: &str, title: &str) -> TabInfo {
    TabInfo::new(id, url, title)
}

fn drain(receiver: &mut tokio::sync::broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_cache_hit_skips_generation() {
    let cache = RecordingCache::new();
    cache.seed(POST, vec!["cached one", "cached two"]).await;
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new().with_page(POST, text_of('a', 9000)),
        cache,
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Post")).await.unwrap().unwrap();

    assert_eq!(entry.state(), EntryState::Done);
    let summary = entry.summary().unwrap();
    assert_eq!(summary.fragments(), ["cached one", "cached two"]);
    assert_eq!(harness.service.state.call_count(), 0);
    assert_eq!(harness.service.state.created_count(SessionKind::Summarizer), 0);
    assert_eq!(harness.content.extraction_count(), 0);
    assert_eq!(harness.cache.set_count_for(POST), 0);
}

#[tokio::test]
async fn test_end_to_end_three_chunks() {
    let text = format!("{}{}{}", text_of('a', 4000), text_of('b', 4000), text_of('c', 1000));
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new().with_page(POST, text),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Post")).await.unwrap().unwrap();

    let expected = vec![
        summary_for(&text_of('a', 4000)),
        summary_for(&text_of('b', 4000)),
        summary_for(&text_of('c', 1000)),
    ];
    assert_eq!(
        harness.calls(),
        vec![text_of('a', 4000), text_of('b', 4000), text_of('c', 1000)]
    );
    harness.service.state.assert_no_overlap();
    assert_eq!(entry.state(), EntryState::Persisted);
    assert_eq!(entry.summary().unwrap().fragments(), expected.as_slice());

    let sets = harness.cache.sets.lock().clone();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].0, POST);
    assert_eq!(sets[0].1.fragments, expected);

    // A second registry over the same cache computes nothing.
    let again = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));
    let entry = again.refresh(tab(2, POST, "Post")).await.unwrap().unwrap();
    assert_eq!(entry.state(), EntryState::Done);
    assert_eq!(entry.summary().unwrap().fragments(), expected.as_slice());
    assert_eq!(harness.service.state.call_count(), 3);
    assert_eq!(harness.content.extraction_count(), 1);
    assert_eq!(harness.cache.set_count_for(POST), 1);
}

#[tokio::test]
async fn test_fragment_order_survives_reversed_latency() {
    let mut config = TabsumConfig::default();
    config.summarizer.chunk_size = 10;
    let chunks = [text_of('p', 10), text_of('q', 10), text_of('r', 10)];
    let service = FakeService::new()
        .with_latency(&chunks[0], Duration::from_millis(30))
        .with_latency(&chunks[1], Duration::from_millis(15))
        .with_latency(&chunks[2], Duration::from_millis(1));
    let harness = Harness::ready(
        config,
        service,
        FakeContent::new().with_page(POST, chunks.concat()),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Post")).await.unwrap().unwrap();

    let expected: Vec<String> = chunks.iter().map(|c| summary_for(c)).collect();
    assert_eq!(entry.summary().unwrap().fragments(), expected.as_slice());
}

#[tokio::test]
async fn test_six_chunks_trigger_one_merge() {
    let text = text_of('m', 24000);
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new().with_page(POST, text),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Long")).await.unwrap().unwrap();

    let calls = harness.calls();
    assert_eq!(calls.len(), 7);
    let chunk_summaries: Vec<String> = (0..6).map(|_| summary_for(&text_of('m', 4000))).collect();
    assert_eq!(calls[6], chunk_summaries.join("\n\n"));

    let summary = entry.summary().unwrap();
    assert_eq!(summary.fragments().len(), 1);
    assert_eq!(summary.fragments()[0], summary_for(&calls[6]));
    assert_eq!(entry.fragments().len(), 1);

    let sets = harness.cache.sets.lock().clone();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].1.fragments.len(), 1);
}

#[tokio::test]
async fn test_five_chunks_do_not_merge() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new().with_page(POST, text_of('m', 20000)),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Long")).await.unwrap().unwrap();

    assert_eq!(harness.service.state.call_count(), 5);
    assert_eq!(entry.summary().unwrap().fragments().len(), 5);
}

#[tokio::test]
async fn test_failed_merge_keeps_chunk_fragments() {
    let chunk_summaries: Vec<String> = (0..6).map(|_| summary_for(&text_of('m', 4000))).collect();
    let service = FakeService::new().failing_on(&chunk_summaries.join("\n\n"));
    let harness = Harness::ready(
        TabsumConfig::default(),
        service,
        FakeContent::new().with_page(POST, text_of('m', 24000)),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Long")).await.unwrap().unwrap();

    assert_eq!(harness.service.state.call_count(), 7);
    assert_eq!(entry.summary().unwrap().fragments(), chunk_summaries.as_slice());
    assert_eq!(harness.cache.set_count_for(POST), 1);
}

#[tokio::test]
async fn test_failed_chunk_is_isolated_to_its_slot() {
    let mut config = TabsumConfig::default();
    config.summarizer.chunk_size = 5;
    let bad = text_of('b', 5);
    let harness = Harness::ready(
        config,
        FakeService::new().failing_on(&bad),
        FakeContent::new().with_page(POST, format!("{}{}{}", text_of('a', 5), bad, text_of('c', 5))),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Post")).await.unwrap().unwrap();

    let summary = entry.summary().unwrap();
    let fragments = summary.fragments();
    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[0], summary_for(&text_of('a', 5)));
    assert!(fragments[1].starts_with("[summary unavailable:"));
    assert_eq!(fragments[2], summary_for(&text_of('c', 5)));
    assert_eq!(entry.state(), EntryState::Persisted);
}

#[tokio::test]
async fn test_extraction_failure_persists_empty_summary() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new(),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Post")).await.unwrap().unwrap();

    assert_eq!(entry.state(), EntryState::Persisted);
    assert!(entry.summary().unwrap().is_empty());
    assert_eq!(harness.service.state.call_count(), 0);
    assert_eq!(harness.cache.set_count_for(POST), 1);
}

#[tokio::test]
async fn test_cache_write_failure_keeps_summary_in_memory() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new().with_page(POST, "short page"),
        RecordingCache::new().failing_writes(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    let entry = registry.refresh(tab(1, POST, "Post")).await.unwrap().unwrap();

    assert_eq!(entry.state(), EntryState::Persisted);
    assert_eq!(
        entry.summary().unwrap().fragments(),
        [summary_for("short page")]
    );
    assert_eq!(harness.cache.set_count_for(POST), 1);
}

#[tokio::test]
async fn test_state_transitions_are_published() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new().with_page(POST, "short page"),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));
    let mut events = harness.pipeline.events().subscribe();

    registry.refresh(tab(3, POST, "Post")).await.unwrap();

    let states: Vec<EntryState> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::EntryState { tab_id, state } if tab_id == TabId(3) => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            EntryState::New,
            EntryState::CacheCheck,
            EntryState::Extracting,
            EntryState::Summarizing { chunks: 1 },
            EntryState::Persisted,
        ]
    );
}

#[tokio::test]
async fn test_navigation_replaces_entry() {
    let old_url = "https://x.example/";
    let new_url = "https://y.example/";
    let mut config = TabsumConfig::default();
    config.summarizer.chunk_size = 10;
    let old_chunks = [text_of('x', 10), text_of('X', 10), text_of('z', 10)];
    let mut service = FakeService::new();
    for chunk in &old_chunks {
        service = service.with_latency(chunk, Duration::from_millis(20));
    }
    let harness = Harness::ready(
        config,
        service,
        FakeContent::new()
            .with_page(old_url, old_chunks.concat())
            .with_page(new_url, text_of('y', 10)),
        RecordingCache::new(),
    )
    .await;
    let registry = Arc::new(TabSummaryRegistry::new(Arc::clone(&harness.pipeline)));
    let mut events = harness.pipeline.events().subscribe();

    let first = registry
        .handle_event(TabEvent::Updated(tab(7, old_url, "Old")))
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let old_entry = registry.get(TabId(7)).unwrap();

    let second = registry
        .handle_event(TabEvent::Navigated(tab(7, new_url, "New")))
        .unwrap()
        .unwrap();
    first.await.unwrap();
    second.await.unwrap();

    let entry = registry.get(TabId(7)).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(entry.url(), new_url);
    assert!(entry.epoch() > old_entry.epoch());
    assert_eq!(entry.state(), EntryState::Persisted);
    assert_eq!(
        entry.summary().unwrap().fragments(),
        [summary_for(&text_of('y', 10))]
    );

    // The superseded run finished into the detached entry only.
    assert!(old_entry.is_detached());
    assert_eq!(old_entry.summary().unwrap().fragments().len(), 3);
    assert_eq!(harness.cache.set_count_for(old_url), 1);
    assert_eq!(harness.cache.set_count_for(new_url), 1);

    let fragment_events: Vec<usize> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::FragmentReady { tab_id, index } if tab_id == TabId(7) => Some(index),
            _ => None,
        })
        .collect();
    assert_eq!(fragment_events, vec![0]);
}

#[tokio::test]
async fn test_untrackable_url_drops_entry() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new().with_page(POST, "page"),
        RecordingCache::new(),
    )
    .await;
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    registry.refresh(tab(1, POST, "Post")).await.unwrap();
    assert_eq!(registry.len(), 1);
    let old = registry.get(TabId(1)).unwrap();

    let result = registry.refresh(tab(1, "chrome://settings", "Settings")).await.unwrap();
    assert!(result.is_none());
    assert!(registry.is_empty());
    assert!(old.is_detached());
    assert_eq!(old.state(), EntryState::Removed);

    assert!(registry.track(tab(2, "file:///tmp/a.html", "File")).unwrap().is_none());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_removed_entry_absorbs_late_work() {
    let mut config = TabsumConfig::default();
    config.summarizer.chunk_size = 4;
    let service = FakeService::new()
        .with_latency(&text_of('a', 4), Duration::from_millis(20))
        .with_latency(&text_of('b', 4), Duration::from_millis(20));
    let harness = Harness::ready(
        config,
        service,
        FakeContent::new().with_page(POST, format!("{}{}", text_of('a', 4), text_of('b', 4))),
        RecordingCache::new(),
    )
    .await;
    let registry = Arc::new(TabSummaryRegistry::new(Arc::clone(&harness.pipeline)));

    let handle = registry
        .handle_event(TabEvent::Updated(tab(4, POST, "Post")))
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(registry.handle_event(TabEvent::Removed(TabId(4))).unwrap().is_none());
    handle.await.unwrap();

    assert!(registry.get(TabId(4)).is_none());
    assert!(registry.entries().is_empty());
    assert_eq!(harness.service.state.call_count(), 2);
}

#[tokio::test]
async fn test_entries_ordered_by_title_and_moved() {
    let harness = Harness::ready(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new(),
        RecordingCache::new(),
    )
    .await;
    let registry = Arc::new(TabSummaryRegistry::new(Arc::clone(&harness.pipeline)));

    registry.track(tab(1, "https://b.example/", "beta")).unwrap();
    registry.track(tab(2, "https://a.example/", "Alpha")).unwrap();
    registry.track(tab(3, "https://c.example/", "charlie")).unwrap();

    let ids = |r: &TabSummaryRegistry| r.entries().iter().map(|e| e.id().0).collect::<Vec<_>>();
    assert_eq!(ids(registry.as_ref()), vec![2, 1, 3]);

    // Re-tracking keeps the position.
    registry.track(tab(2, "https://a.example/next", "zulu")).unwrap();
    assert_eq!(ids(registry.as_ref()), vec![2, 1, 3]);

    registry
        .handle_event(TabEvent::Moved {
            tab_id: TabId(3),
            index: 0,
        })
        .unwrap();
    assert_eq!(ids(registry.as_ref()), vec![3, 2, 1]);

    registry.move_to(TabId(3), 99);
    assert_eq!(ids(registry.as_ref()), vec![2, 1, 3]);

    registry.handle_event(TabEvent::Activated(TabId(1))).unwrap();
    assert_eq!(registry.active(), Some(TabId(1)));
    registry.remove(TabId(1));
    assert_eq!(registry.active(), None);
}

#[tokio::test]
async fn test_no_entries_before_service_is_ready() {
    let harness = Harness::build(
        TabsumConfig::default(),
        FakeService::new(),
        FakeContent::new(),
        RecordingCache::new(),
    );
    let registry = TabSummaryRegistry::new(Arc::clone(&harness.pipeline));

    assert!(matches!(
        registry.track(tab(1, POST, "Post")),
        Err(PipelineError::NotReady(_))
    ));
    assert!(registry.is_empty());
    assert_eq!(harness.cache.gets.load(Ordering::SeqCst), 0);
}

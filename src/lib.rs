//! Tabsum: cache-first tab summarization with a serialized generation queue.
//!
//! Tabs are tracked by a registry that summarizes each page in fixed-size
//! chunks through one shared queue, persists the combined summary per URL, and
//! answers questions across all resolved summaries.

pub mod cache;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod generation;
pub mod logging;
pub mod negotiation;
pub mod pipeline;
pub mod query;
pub mod queue;
pub mod registry;
pub mod tabs;

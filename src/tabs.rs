//! Tab identity and lifecycle events reported by the browser side.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display titles are clipped to this many characters.
pub const TITLE_DISPLAY_CHARS: usize = 40;

/// Browser tab identifier, unique among open tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TabId {
    fn from(id: u64) -> Self {
        TabId(id)
    }
}

/// Snapshot of one open tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub window_id: Option<u64>,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl TabInfo {
    pub fn new(id: impl Into<TabId>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            window_id: None,
            url: url.into(),
            title: title.into(),
            icon_url: None,
        }
    }

    /// Title clipped for list rendering
    pub fn display_title(&self) -> String {
        self.title.chars().take(TITLE_DISPLAY_CHARS).collect()
    }

    /// Context string shared with the summarization session
    pub fn shared_context(&self) -> String {
        format!("A web page titled \"{}\" at {}", self.title, self.url)
    }
}

/// Tab lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    /// Tab created, or finished loading
    Updated(TabInfo),
    /// Same tab id now shows a different URL
    Navigated(TabInfo),
    Removed(TabId),
    Activated(TabId),
    /// Tab moved to a new position in the strip
    Moved { tab_id: TabId, index: usize },
}

/// Only `http` and `https` pages are tracked.
pub fn is_trackable_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

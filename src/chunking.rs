//! Chunking of extracted page text and merge rules for the resulting fragments.

/// Separator placed between fragments when they are joined.
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Split `text` into contiguous, non-overlapping chunks of `chunk_size`
/// characters. The last chunk may be shorter; empty text yields no chunks.
pub fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(text.len() / chunk_size + 1);
    let mut current = String::new();
    let mut count = 0;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == chunk_size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// A summary-of-summaries pass runs when the chunk count exceeds the threshold.
pub fn needs_merge(chunk_count: usize, merge_threshold: usize) -> bool {
    chunk_count > merge_threshold
}

/// Join fragment texts in order.
pub fn join_fragments<S: AsRef<str>>(fragments: &[S]) -> String {
    fragments
        .iter()
        .map(|f| f.as_ref())
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR)
}

//! Memory capture for edited documents
//!
//! A document written under a folder (or with a file name) that names a
//! memory category becomes a memory item sourced from its path. Editing the
//! same document again updates that item instead of adding another one.

use crate::memory::{Entities, MemoryPatch, MemorySource, MemoryStore, MemoryType, NewMemory};
use sdk::errors::EngineError;
use tracing::{debug, warn};

/// Longest summary taken from a document
const MAX_SUMMARY_CHARS: usize = 200;

/// Keywords recognised in path segments, checked in this order
const CATEGORY_KEYWORDS: [(&str, MemoryType); 10] = [
    ("assumption", MemoryType::Assumption),
    ("decision", MemoryType::Decision),
    ("customer", MemoryType::CustomerConvo),
    ("interview", MemoryType::CustomerConvo),
    ("evidence", MemoryType::Evidence),
    ("research", MemoryType::Evidence),
    ("contradiction", MemoryType::Contradiction),
    ("lesson", MemoryType::Lesson),
    ("retro", MemoryType::Lesson),
    ("milestone", MemoryType::Milestone),
];

/// Memory category named by `path`, preferring the deepest matching segment
pub fn category_for_path(path: &str) -> Option<MemoryType> {
    path.split('/')
        .rev()
        .map(|segment| segment.to_lowercase())
        .find_map(|segment| {
            CATEGORY_KEYWORDS
                .iter()
                .find(|(keyword, _)| segment.contains(keyword))
                .map(|(_, memory_type)| *memory_type)
        })
}

/// First heading, or failing that the first line with text
///
/// Bare `#` markers count as neither.
pub fn summarize(content: &str) -> Option<String> {
    let lines = || {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.trim_start_matches('#').trim().is_empty())
    };

    let line = lines()
        .find(|l| l.starts_with('#'))
        .map(|l| l.trim_start_matches('#').trim())
        .or_else(|| lines().next())?;

    Some(line.chars().take(MAX_SUMMARY_CHARS).collect())
}

/// Record a memory for a freshly written document
///
/// Returns `Ok(None)` when the path names no category or the document is blank.
pub async fn capture(
    store: &dyn MemoryStore,
    path: &str,
    content: &str,
) -> Result<Option<String>, EngineError> {
    let Some(memory_type) = category_for_path(path) else {
        return Ok(None);
    };
    let Some(summary) = summarize(content) else {
        debug!(path, "Skipping capture of blank document");
        return Ok(None);
    };

    let entities = Entities {
        ideas: path
            .split('/')
            .next()
            .filter(|top| path.contains('/') && !top.is_empty())
            .map(|top| vec![top.to_string()])
            .unwrap_or_default(),
        artifacts: vec![path.to_string()],
        ..Default::default()
    };
    let details = Some(content.trim().to_string());

    if let Some(existing) = store.find_by_source_ref(path).await? {
        let patch = MemoryPatch {
            summary: Some(summary),
            details,
            entities: Some(entities),
            ..Default::default()
        };
        let updated = store.update(&existing.id, patch).await?;
        debug!(id = %updated.id, path, "Refreshed captured memory");
        return Ok(Some(updated.id));
    }

    let input = NewMemory {
        memory_type: Some(memory_type),
        summary,
        details,
        entities,
        source: Some(MemorySource::system_rule(path)),
        ..Default::default()
    };
    let created = store.create(input).await?;
    debug!(id = %created.id, path, memory_type = %memory_type, "Captured memory");
    Ok(Some(created.id))
}

/// Run `capture`, logging instead of returning failures
pub async fn capture_quietly(store: &dyn MemoryStore, path: &str, content: &str) {
    if let Err(e) = capture(store, path, content).await {
        warn!(path, error = %e, "Memory capture failed");
    }
}

//! Relevance retrieval
//!
//! Each memory gets a weighted score built from four signals, each in [0, 1]:
//!
//! | Signal     | Default weight | Value                                          |
//! |------------|----------------|------------------------------------------------|
//! | importance | 0.3            | stored importance, clamped                     |
//! | recency    | 0.2            | `exp(-age_days / scale)`, age since creation   |
//! | lexical    | 0.3            | share of query tokens found in the memory text |
//! | entity     | 0.2            | `increment` per idea in the active set, capped |
//!
//! Ranking is a stable sort, so equal scores keep the store's order.

use crate::config::{MemoryConfig, RelevanceWeights};
use crate::memory::{Entities, MemoryItem, MemoryStore, MemoryType, Signals};
use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Caller-supplied retrieval context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalContext {
    /// Ideas the user is currently working on
    #[serde(default)]
    pub active_ideas: Vec<String>,

    /// Overrides `memory.max_results`
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// A memory with its relevance score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedMemory {
    pub id: String,
    pub memory_type: MemoryType,
    pub summary: String,
    pub importance: f64,
    pub entities: Entities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
    pub score: f64,
}

/// Scores and ranks memory snapshots
#[derive(Debug, Clone)]
pub struct RelevanceEngine {
    weights: RelevanceWeights,
    recency_scale_days: f64,
    entity_match_increment: f64,
    max_results: usize,
}

impl Default for RelevanceEngine {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}

impl RelevanceEngine {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            weights: config.weights,
            recency_scale_days: config.recency_scale_days,
            entity_match_increment: config.entity_match_increment,
            max_results: config.max_results,
        }
    }

    /// Rank a snapshot of the store
    pub async fn retrieve(
        &self,
        store: &dyn MemoryStore,
        query: &str,
        ctx: &RetrievalContext,
    ) -> Result<Vec<RankedMemory>, EngineError> {
        let items = store.list().await?;
        let ranked = self.rank(&items, query, ctx, Utc::now());

        debug!(
            candidates = items.len(),
            returned = ranked.len(),
            "Ranked memories"
        );

        Ok(ranked)
    }

    /// Score every item and return the best `max_results`, highest first
    pub fn rank(
        &self,
        items: &[MemoryItem],
        query: &str,
        ctx: &RetrievalContext,
        now: DateTime<Utc>,
    ) -> Vec<RankedMemory> {
        let query_tokens = tokenize(query);
        let active_ideas: HashSet<String> = ctx
            .active_ideas
            .iter()
            .map(|idea| idea.trim().to_lowercase())
            .filter(|idea| !idea.is_empty())
            .collect();

        let mut ranked: Vec<RankedMemory> = items
            .iter()
            .map(|item| RankedMemory {
                id: item.id.clone(),
                memory_type: item.memory_type,
                summary: item.summary.clone(),
                importance: item.importance,
                entities: item.entities.clone(),
                signals: item.signals.clone(),
                score: self.score(item, &query_tokens, &active_ideas, now),
            })
            .collect();

        // Vec::sort_by is stable
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(ctx.max_results.unwrap_or(self.max_results));

        ranked
    }

    fn score(
        &self,
        item: &MemoryItem,
        query_tokens: &[String],
        active_ideas: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> f64 {
        self.weights.importance * item.importance.clamp(0.0, 1.0)
            + self.weights.recency * self.recency(item.created_at, now)
            + self.weights.lexical * lexical_overlap(item, query_tokens)
            + self.weights.entity * self.entity_match(&item.entities, active_ideas)
    }

    fn recency(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_seconds = (now - timestamp).num_seconds().max(0) as f64;
        let age_days = age_seconds / SECONDS_PER_DAY;
        (-age_days / self.recency_scale_days).exp()
    }

    fn entity_match(&self, entities: &Entities, active_ideas: &HashSet<String>) -> f64 {
        let matches = entities
            .ideas
            .iter()
            .filter(|idea| active_ideas.contains(&idea.trim().to_lowercase()))
            .count();

        (matches as f64 * self.entity_match_increment).min(1.0)
    }
}

fn lexical_overlap(item: &MemoryItem, query_tokens: &[String]) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }

    let mut text = item.summary.clone();
    if let Some(details) = &item.details {
        text.push(' ');
        text.push_str(details);
    }
    let memory_tokens: HashSet<String> = tokenize(&text).into_iter().collect();

    let hits = query_tokens
        .iter()
        .filter(|token| memory_tokens.contains(*token))
        .count();

    hits as f64 / query_tokens.len() as f64
}

/// Lower-case, strip punctuation, split on whitespace, keep tokens longer than two chars
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .filter(|token| token.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

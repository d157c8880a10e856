//! Long-lived memory
//!
//! Memories are durable facts (decisions, lessons, customer conversations...)
//! that are never fetched by key during a chat. Instead the relevance engine
//! scores a snapshot of the store against a query and surfaces the top few.
//!
//! - `types`: the memory item model and its validation rules
//! - `retrieval`: relevance scoring and ranking
//! - `MemoryStore`: persistence seam, implemented by `db::memory::SqliteMemoryStore`

use async_trait::async_trait;
use sdk::errors::EngineError;

pub mod retrieval;
pub mod types;

pub use retrieval::{tokenize, RankedMemory, RelevanceEngine, RetrievalContext};
pub use types::{
    Entities, EvidenceQuality, MemoryItem, MemoryPatch, MemorySource, MemoryType, MoneySignal,
    NewMemory, Signals, SourceKind,
};

/// Durable storage for memory items
///
/// Items are never deleted. `list` returns a snapshot in insertion order,
/// which the relevance engine relies on to break score ties.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Validate and store a new memory
    ///
    /// An item of the same type with exactly the same summary is returned
    /// instead of creating a duplicate, with `updated_at` refreshed.
    async fn create(&self, input: NewMemory) -> Result<MemoryItem, EngineError>;

    /// Apply a partial update. Fails with `MemoryNotFound` for unknown ids.
    async fn update(&self, id: &str, patch: MemoryPatch) -> Result<MemoryItem, EngineError>;

    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, EngineError>;

    async fn list(&self) -> Result<Vec<MemoryItem>, EngineError>;

    /// Find the memory whose source points at `reference`, if any
    async fn find_by_source_ref(&self, reference: &str)
        -> Result<Option<MemoryItem>, EngineError>;
}

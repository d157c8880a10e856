//! Chat sessions
//!
//! A `Session` owns one canonical history. `SessionManager` keeps the live
//! sessions, each behind its own async mutex so that turns on one session
//! are serialized while different sessions run in parallel. When a
//! `SessionRepository` is attached every session is loaded from and saved to
//! it; the most recent write wins. A deleted session is never written again,
//! even by a turn that was still running when it was deleted.

use chrono::{DateTime, Utc};
use sdk::errors::EngineError;
use sdk::types::ConversationTurn;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::history::ConversationHistory;
use crate::db::{SessionRecord, SessionRepository};

/// Title of a session that has not been named yet
pub const DEFAULT_TITLE: &str = "New Chat";

/// Characters of the first message kept in an automatic title
pub const TITLE_MAX_CHARS: usize = 50;

/// Title derived from the first user message
///
/// Returns `None` for a blank message.
pub fn title_from_message(message: &str) -> Option<String> {
    let message = message.trim();
    if message.is_empty() {
        return None;
    }

    let mut title: String = message.chars().take(TITLE_MAX_CHARS).collect();
    if message.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    Some(title)
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Completed user/model exchanges
    pub exchanges: u32,
    pub history: ConversationHistory,

    deleted: Arc<AtomicBool>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            exchanges: 0,
            history: ConversationHistory::new(),
            deleted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_record(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            created_at: record.created_at,
            updated_at: record.updated_at,
            exchanges: record.exchanges,
            history: ConversationHistory::from_turns(record.history),
            deleted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            exchanges: self.exchanges,
            history: self.history.turns().to_vec(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Count a finished exchange, naming the session after its first message
    pub fn complete_exchange(&mut self, user_message: &str) {
        if self.exchanges == 0 && self.title == DEFAULT_TITLE {
            if let Some(title) = title_from_message(user_message) {
                debug!(session = %self.id, title = %title, "Auto-titled session");
                self.title = title;
            }
        }
        self.exchanges += 1;
        self.touch();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            exchanges: self.exchanges,
            turns: self.history.len(),
        }
    }

    pub fn detail(&self) -> SessionDetail {
        SessionDetail {
            summary: self.summary(),
            history: self.history.turns().to_vec(),
        }
    }
}

/// Session metadata without its history
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exchanges: u32,
    pub turns: usize,
}

/// Session metadata with its full history
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub history: Vec<ConversationTurn>,
}

/// A live session and its deletion flag, readable without the session lock
struct LiveSession {
    handle: Arc<Mutex<Session>>,
    deleted: Arc<AtomicBool>,
}

/// Owner of every live session
pub struct SessionManager {
    sessions: Mutex<HashMap<String, LiveSession>>,
    repository: Option<SessionRepository>,
}

impl SessionManager {
    /// Manager keeping sessions in memory only
    pub fn in_memory() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            repository: None,
        }
    }

    /// Manager backed by a session repository
    pub fn with_repository(repository: SessionRepository) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            repository: Some(repository),
        }
    }

    /// Live handle for `id`, loading or creating the session on first reference
    pub async fn handle(&self, id: &str) -> Result<Arc<Mutex<Session>>, EngineError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(live) = sessions.get(id) {
            return Ok(Arc::clone(&live.handle));
        }

        let session = match self.load(id).await? {
            Some(session) => {
                debug!(session = %id, "Loaded session from repository");
                session
            }
            None => {
                info!(session = %id, "Created session");
                Session::new(id)
            }
        };

        let deleted = Arc::clone(&session.deleted);
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(
            id.to_string(),
            LiveSession {
                handle: Arc::clone(&handle),
                deleted,
            },
        );
        Ok(handle)
    }

    /// Create a session (a new id when `id` is `None`) and store it
    ///
    /// An existing session with the same id is returned unchanged.
    pub async fn create_session(&self, id: Option<&str>) -> Result<SessionSummary, EngineError> {
        let id = id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let handle = self.handle(&id).await?;
        let session = handle.lock().await;
        self.save(&session).await?;
        Ok(session.summary())
    }

    /// All known sessions, most recently updated first
    ///
    /// A session that is mid-turn is reported as last persisted.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, EngineError> {
        let mut summaries: HashMap<String, SessionSummary> = HashMap::new();

        if let Some(repository) = &self.repository {
            for record in repository.list().await.map_err(db_error)? {
                let session = Session::from_record(record);
                summaries.insert(session.id.clone(), session.summary());
            }
        }

        let live: Vec<Arc<Mutex<Session>>> =
            self
            .sessions
            .lock()
            .await
            .values()
            .map(|live| Arc::clone(&live.handle))
            .collect();
        for handle in live {
            if let Ok(session) = handle.try_lock() {
                summaries.insert(session.id.clone(), session.summary());
            }
        }

        let mut summaries: Vec<SessionSummary> = summaries.into_values().collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }

    /// Summary and history of an existing session
    pub async fn session(&self, id: &str) -> Result<SessionDetail, EngineError> {
        let handle = self.existing(id).await?;
        let session = handle.lock().await;
        Ok(session.detail())
    }

    /// Rename a session. A blank title leaves the current one in place.
    pub async fn rename_session(
        &self,
        id: &str,
        title: &str,
    ) -> Result<SessionSummary, EngineError> {
        let handle = self.existing(id).await?;
        let mut session = handle.lock().await;

        let title = title.trim();
        if title.is_empty() {
            debug!(session = %id, "Ignoring blank session title");
            return Ok(session.summary());
        }

        session.title = title.to_string();
        session.touch();
        self.save(&session).await?;
        Ok(session.summary())
    }

    /// Forget a session and its history. Returns whether it existed.
    ///
    /// A turn still running on the session finishes, but its history is
    /// dropped; the next message on `id` starts a new session.
    pub async fn delete_session(&self, id: &str) -> Result<bool, EngineError> {
        let removed = self.sessions.lock().await.remove(id);
        if let Some(live) = &removed {
            live.deleted.store(true, Ordering::SeqCst);
        }
        let was_live = removed.is_some();

        let was_stored = match &self.repository {
            Some(repository) => repository.delete(id).await.map_err(db_error)?,
            None => false,
        };

        if was_live || was_stored {
            info!(session = %id, "Deleted session");
        }
        Ok(was_live || was_stored)
    }

    /// Save a session, logging instead of failing
    pub async fn persist(&self, session: &Session) {
        if let Err(e) = self.save(session).await {
            warn!(session = %session.id, error = %e, "Failed to persist session");
        }
    }

    async fn save(&self, session: &Session) -> Result<(), EngineError> {
        if session.is_deleted() {
            debug!(session = %session.id, "Skipping save of deleted session");
            return Ok(());
        }
        match &self.repository {
            Some(repository) => repository
                .save(&session.to_record())
                .await
                .map_err(db_error),
            None => Ok(()),
        }
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, EngineError> {
        match &self.repository {
            Some(repository) => Ok(repository
                .get(id)
                .await
                .map_err(db_error)?
                .map(Session::from_record)),
            None => Ok(None),
        }
    }

    /// Handle of a session that is live or stored, without creating one
    async fn existing(&self, id: &str) -> Result<Arc<Mutex<Session>>, EngineError> {
        let known = self.sessions.lock().await.contains_key(id) || self.load(id).await?.is_some();
        if !known {
            return Err(EngineError::SessionNotFound(id.to_string()));
        }
        self.handle(id).await
    }
}

fn db_error(e: anyhow::Error) -> EngineError {
    EngineError::Database(format!("{:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    #[test]
    fn test_title_from_message() {
        assert_eq!(
            title_from_message("  Plan the launch  ").as_deref(),
            Some("Plan the launch")
        );

        let long = "a".repeat(60);
        let title = title_from_message(&long).unwrap();
        assert_eq!(title, format!("{}...", "a".repeat(50)));

        let exact = "b".repeat(50);
        assert_eq!(title_from_message(&exact).unwrap(), exact);
        assert_eq!(title_from_message("   "), None);
    }

    #[test]
    fn test_complete_exchange_titles_once() {
        let mut session = Session::new("s1");
        session.complete_exchange("first question");
        session.complete_exchange("second question");

        assert_eq!(session.title, "first question");
        assert_eq!(session.exchanges, 2);
    }

    #[test]
    fn test_complete_exchange_keeps_custom_title() {
        let mut session = Session::new("s1");
        session.title = "Pricing".to_string();
        session.complete_exchange("first question");

        assert_eq!(session.title, "Pricing");
    }

    #[tokio::test]
    async fn test_handle_creates_once() {
        let manager = SessionManager::in_memory();

        let first = manager.handle("s1").await.unwrap();
        let second = manager.handle("s1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lock().await.title, DEFAULT_TITLE);
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let manager = SessionManager::in_memory();
        manager.create_session(Some("s1")).await.unwrap();

        let renamed = manager.rename_session("s1", "Launch plan").await.unwrap();
        assert_eq!(renamed.title, "Launch plan");

        let unchanged = manager.rename_session("s1", "   ").await.unwrap();
        assert_eq!(unchanged.title, "Launch plan");

        assert!(manager.delete_session("s1").await.unwrap());
        assert!(!manager.delete_session("s1").await.unwrap());
        assert!(matches!(
            manager.session("s1").await,
            Err(EngineError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deleted_session_is_not_saved_again() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("forge.db")).await.unwrap();
        let manager = SessionManager::with_repository(db.sessions());

        let handle = manager.handle("s1").await.unwrap();
        let mut session = handle.lock().await;
        session.history.push(ConversationTurn::user("old message"));
        manager.persist(&session).await;

        assert!(manager.delete_session("s1").await.unwrap());
        assert!(session.is_deleted());

        session.complete_exchange("old message");
        manager.persist(&session).await;
        drop(session);

        assert!(db.sessions().get("s1").await.unwrap().is_none());
        let fresh = manager.handle("s1").await.unwrap();
        assert!(!Arc::ptr_eq(&fresh, &handle));
        assert!(fresh.lock().await.history.is_empty());
    }

    #[tokio::test]
    async fn test_rename_unknown_session() {
        let manager = SessionManager::in_memory();
        assert!(matches!(
            manager.rename_session("missing", "x").await,
            Err(EngineError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sessions_survive_restart() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("forge.db")).await.unwrap();

        {
            let manager = SessionManager::with_repository(db.sessions());
            let handle = manager.handle("s1").await.unwrap();
            let mut session = handle.lock().await;
            session.history.push(ConversationTurn::user("hello"));
            session.complete_exchange("hello");
            manager.persist(&session).await;
        }

        let manager = SessionManager::with_repository(db.sessions());
        let detail = manager.session("s1").await.unwrap();
        assert_eq!(detail.summary.title, "hello");
        assert_eq!(detail.summary.exchanges, 1);
        assert_eq!(detail.history.len(), 1);

        let listed = manager.list_sessions().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "s1");
    }

    #[tokio::test]
    async fn test_create_session_generates_id() {
        let manager = SessionManager::in_memory();
        let created = manager.create_session(None).await.unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.title, DEFAULT_TITLE);
        assert_eq!(manager.list_sessions().await.unwrap().len(), 1);
    }
}

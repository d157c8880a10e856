//! Agent Core
//!
//! This module implements the orchestration loop that answers one user
//! message. Each turn runs through an iterate-until-terminal cycle:
//!
//! 1. Append the user message to the session's canonical history
//! 2. Build the system prompt with a fresh workspace tree snapshot
//! 3. Ask the provider for the next model turn (bounded by a timeout)
//! 4. If the turn is terminal: return its text
//! 5. Otherwise run every tool call in order, append the results, continue
//!
//! # Limits
//!
//! - `agent.max_iterations` model turns per user message (default 10)
//! - `agent.llm_timeout_secs` per provider call (default 120)
//!
//! The session is persisted after every appended turn, whether the user turn
//! ends in an answer or an error.

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{send_event, AgentEvent, EventSender};
use super::prompt::build_system_prompt;
use super::session::{Session, SessionDetail, SessionManager, SessionSummary};
use crate::config::{AgentConfig, BusyPolicy};
use crate::llm::{LLMProvider, ProviderRouter};
use crate::tools::{ToolExecutor, ToolOutcome};
use sdk::errors::{EngineError, UpstreamError};
use sdk::types::{ToolCall, ToolDeclaration, ToolResult};

/// Reply text used when the terminal turn carries no text
pub const NO_RESPONSE: &str = "(No response)";

/// Error payload given to calls that were cut off by cancellation
pub const CANCELLED_CALL_ERROR: &str = "Cancelled";

/// Answer to one user message
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatReply {
    pub session_id: String,

    /// Text of the terminal model turn
    pub text: String,

    /// Workspace paths written during this turn, in first-edit order
    pub edited_files: Vec<String>,

    /// Model turns it took to reach the answer
    pub iterations: usize,
}

/// Orchestrates chats between sessions, a provider and the workspace tools
pub struct AgentService {
    router: Arc<ProviderRouter>,
    tools: Arc<ToolExecutor>,
    sessions: SessionManager,
    config: AgentConfig,

    /// Provider override; the router default is used when unset
    provider: Option<String>,
}

impl AgentService {
    pub fn new(
        router: Arc<ProviderRouter>,
        tools: Arc<ToolExecutor>,
        sessions: SessionManager,
        config: AgentConfig,
    ) -> Self {
        Self {
            router,
            tools,
            sessions,
            config,
            provider: None,
        }
    }

    /// Use the named provider instead of the configured default
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Answer `message` in the session `session_id`
    ///
    /// The session is created on first reference.
    ///
    /// # Errors
    ///
    /// - `EngineError::Upstream` when the provider fails or times out
    /// - `EngineError::MaxIterationsExceeded` when no terminal turn arrives in budget
    /// - `EngineError::SessionBusy` when the session is mid-turn and the busy
    ///   policy is `reject`
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
        events: Option<&EventSender>,
    ) -> Result<ChatReply, EngineError> {
        self.chat_with_cancel(session_id, message, events, CancellationToken::new())
            .await
    }

    /// Like `chat`, stopping with `EngineError::Cancelled` once `cancel` fires
    pub async fn chat_with_cancel(
        &self,
        session_id: &str,
        message: &str,
        events: Option<&EventSender>,
        cancel: CancellationToken,
    ) -> Result<ChatReply, EngineError> {
        let provider = self.router.select(self.provider.as_deref())?;
        let handle = self.sessions.handle(session_id).await?;

        let mut session = match self.config.busy_policy {
            BusyPolicy::Queue => handle.lock().await,
            BusyPolicy::Reject => handle
                .try_lock()
                .map_err(|_| EngineError::SessionBusy(session_id.to_string()))?,
        };

        let start_time = Instant::now();
        info!(
            session = %session_id,
            provider = provider.name(),
            "Starting turn"
        );

        session.touch();
        session.history.push(provider.encode_user_message(message));
        self.sessions.persist(&session).await;

        let tree = match self.tools.workspace().render_tree().await {
            Ok(tree) => tree,
            Err(e) => {
                warn!(error = %e, "Failed to snapshot workspace tree");
                format!("(unable to read workspace: {})", e)
            }
        };
        let system_prompt = build_system_prompt(&tree);

        let result = self
            .run_loop(
                &mut session,
                provider.as_ref(),
                &system_prompt,
                message,
                events,
                &cancel,
            )
            .await;

        session.touch();
        self.sessions.persist(&session).await;

        match &result {
            Ok(reply) => info!(
                session = %session_id,
                iterations = reply.iterations,
                edited = reply.edited_files.len(),
                "Turn completed in {}ms",
                start_time.elapsed().as_millis()
            ),
            Err(e) => error!(session = %session_id, "Turn failed: {}", e),
        }

        result
    }

    async fn run_loop(
        &self,
        session: &mut Session,
        provider: &dyn LLMProvider,
        system_prompt: &str,
        message: &str,
        events: Option<&EventSender>,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, EngineError> {
        let declarations: Vec<ToolDeclaration> = ToolExecutor::declarations();
        let max_iterations = self.config.max_iterations;
        let llm_timeout = Duration::from_secs(self.config.llm_timeout_secs);
        let mut edited_files: Vec<String> = Vec::new();

        for iteration in 1..=max_iterations {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            debug!(
                "Session {} iteration {}/{}",
                session.id, iteration, max_iterations
            );

            let llm_result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                result = timeout(
                    llm_timeout,
                    provider.generate(system_prompt, session.history.turns(), &declarations),
                ) => result,
            };

            let turn = match llm_result {
                Ok(Ok(turn)) => turn,
                Ok(Err(e)) => {
                    error!("LLM call failed: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    error!("LLM call timed out after {}s", self.config.llm_timeout_secs);
                    return Err(UpstreamError::Timeout.into());
                }
            };

            // An explicit stop signal wins over leftover calls
            let terminal = provider.is_terminal(&turn) || !turn.has_tool_calls();
            let turn = if terminal && turn.has_tool_calls() {
                warn!(
                    "Dropping {} tool call(s) from a terminal turn",
                    turn.tool_calls().len()
                );
                turn.without_tool_calls()
            } else {
                turn
            };

            let encoded = provider.encode_model_turn(turn);
            let calls: Vec<ToolCall> = encoded.tool_calls().into_iter().cloned().collect();
            let text = encoded.text();
            session.history.push(encoded);

            if terminal {
                session.complete_exchange(message);
                let text = if text.trim().is_empty() {
                    NO_RESPONSE.to_string()
                } else {
                    text
                };

                return Ok(ChatReply {
                    session_id: session.id.clone(),
                    text,
                    edited_files,
                    iterations: iteration,
                });
            }

            self.sessions.persist(session).await;

            debug!("Dispatching {} tool call(s)", calls.len());
            let (results, cancelled) = self
                .dispatch(&calls, events, cancel, &mut edited_files)
                .await;
            session.history.push(provider.encode_tool_results(results));
            self.sessions.persist(session).await;

            if cancelled {
                return Err(EngineError::Cancelled);
            }
        }

        error!(
            "Session {} exceeded max iterations ({})",
            session.id, max_iterations
        );
        Err(EngineError::MaxIterationsExceeded {
            iterations: max_iterations,
            edited_files,
        })
    }

    /// Run one round of tool calls, returning results in call order
    ///
    /// Calls that had not finished when `cancel` fired get an error result,
    /// so the returned vector always matches `calls` one to one. Calls that
    /// did finish keep their real outcome.
    async fn dispatch(
        &self,
        calls: &[ToolCall],
        events: Option<&EventSender>,
        cancel: &CancellationToken,
        edited_files: &mut Vec<String>,
    ) -> (Vec<ToolResult>, bool) {
        let mut slots: Vec<Option<ToolResult>> = calls.iter().map(|_| None).collect();

        if self.config.parallel_tools {
            for call in calls {
                send_event(
                    events,
                    AgentEvent::Status {
                        message: ToolExecutor::describe_action(call),
                    },
                );
            }

            let mut running: FuturesUnordered<_> = calls
                .iter()
                .enumerate()
                .map(|(index, call)| async move { (index, self.tools.execute(call).await) })
                .collect();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = running.next() => next,
                };
                match next {
                    Some((index, outcome)) => {
                        slots[index] = Some(record_outcome(outcome, events, edited_files))
                    }
                    None => break,
                }
            }

            // Calls that completed alongside the cancellation
            while let Some(Some((index, outcome))) = running.next().now_or_never() {
                slots[index] = Some(record_outcome(outcome, events, edited_files));
            }
        } else {
            for (index, call) in calls.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                send_event(
                    events,
                    AgentEvent::Status {
                        message: ToolExecutor::describe_action(call),
                    },
                );

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    outcome = self.tools.execute(call) => Some(outcome),
                };
                match outcome {
                    Some(outcome) => {
                        slots[index] = Some(record_outcome(outcome, events, edited_files))
                    }
                    None => break,
                }
            }
        }

        let outstanding = slots.iter().filter(|slot| slot.is_none()).count();
        if outstanding > 0 {
            warn!("Cancelled with {} tool call(s) outstanding", outstanding);
        }

        let results = calls
            .iter()
            .zip(slots)
            .map(|(call, slot)| {
                slot.unwrap_or_else(|| ToolResult::error(call, CANCELLED_CALL_ERROR))
            })
            .collect();

        (results, outstanding > 0)
    }

    pub async fn create_session(&self, id: Option<&str>) -> Result<SessionSummary, EngineError> {
        self.sessions.create_session(id).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, EngineError> {
        self.sessions.list_sessions().await
    }

    pub async fn session(&self, id: &str) -> Result<SessionDetail, EngineError> {
        self.sessions.session(id).await
    }

    pub async fn rename_session(
        &self,
        id: &str,
        title: &str,
    ) -> Result<SessionSummary, EngineError> {
        self.sessions.rename_session(id, title).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<bool, EngineError> {
        self.sessions.delete_session(id).await
    }
}

/// Report a finished call and note the file it wrote
fn record_outcome(
    outcome: ToolOutcome,
    events: Option<&EventSender>,
    edited_files: &mut Vec<String>,
) -> ToolResult {
    send_event(
        events,
        AgentEvent::ToolFinished {
            name: outcome.result.name.clone(),
            is_error: outcome.result.is_error(),
        },
    );
    if let Some(path) = outcome.edited_path {
        send_event(events, AgentEvent::FileEdited { path: path.clone() });
        if !edited_files.contains(&path) {
            edited_files.push(path);
        }
    }
    outcome.result
}

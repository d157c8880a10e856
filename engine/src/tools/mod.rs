pub mod capture;
pub mod workspace;

pub use workspace::{FsWorkspace, Workspace};

use crate::memory::MemoryStore;
use sdk::errors::EngineError;
use sdk::types::{ParameterSpec, ToolCall, ToolDeclaration, ToolResult};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub const EDIT_FILE: &str = "edit_file";
pub const READ_FILE: &str = "read_file";
pub const GET_FILE_TREE: &str = "get_file_tree";

/// Arguments of a tool call, validated before dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    EditFile { path: String, content: String },
    ReadFile { path: String },
    GetFileTree,
}

#[derive(Deserialize)]
struct EditFileArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

impl ToolArgs {
    /// Parse the arguments of the tool called `name`
    ///
    /// The error is the message handed back to the model.
    pub fn parse(name: &str, args: &Value) -> Result<Self, String> {
        let invalid = |e: serde_json::Error| format!("Invalid arguments for {}: {}", name, e);

        match name {
            EDIT_FILE => {
                let args: EditFileArgs = serde_json::from_value(args.clone()).map_err(invalid)?;
                Ok(Self::EditFile {
                    path: args.path,
                    content: args.content,
                })
            }
            READ_FILE => {
                let args: ReadFileArgs = serde_json::from_value(args.clone()).map_err(invalid)?;
                Ok(Self::ReadFile { path: args.path })
            }
            GET_FILE_TREE => Ok(Self::GetFileTree),
            _ => Err(format!("Unknown function: {}", name)),
        }
    }
}

/// Result of one dispatched call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub result: ToolResult,

    /// Workspace path written by the call, if any
    pub edited_path: Option<String>,
}

/// Executes the workspace tools offered to the model.
///
/// Every failure is returned as a tool-level error payload so the model can
/// see it and pick a different action. Nothing here aborts a turn.
pub struct ToolExecutor {
    workspace: Arc<dyn Workspace>,
    memory: Arc<dyn MemoryStore>,
    capture_on_edit: bool,
}

impl ToolExecutor {
    pub fn new(
        workspace: Arc<dyn Workspace>,
        memory: Arc<dyn MemoryStore>,
        capture_on_edit: bool,
    ) -> Self {
        Self {
            workspace,
            memory,
            capture_on_edit,
        }
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    /// Declarations of every tool, in the order they are offered
    pub fn declarations() -> Vec<ToolDeclaration> {
        vec![
            ToolDeclaration::new(
                EDIT_FILE,
                "Create or overwrite a document in the workspace with the given content.",
            )
            .with_param(
                "path",
                ParameterSpec::required_string(
                    "Workspace-relative path of the document, e.g. ideas/acme/assumptions.md",
                ),
            )
            .with_param(
                "content",
                ParameterSpec::required_string("The complete new content of the document"),
            ),
            ToolDeclaration::new(READ_FILE, "Read the current content of a workspace document.")
                .with_param(
                    "path",
                    ParameterSpec::required_string("Workspace-relative path of the document"),
                ),
            ToolDeclaration::new(
                GET_FILE_TREE,
                "List every folder and document currently in the workspace.",
            ),
        ]
    }

    /// Human-readable status line for a call about to run
    pub fn describe_action(call: &ToolCall) -> String {
        let file = || {
            call.args
                .get("path")
                .and_then(|p| p.as_str())
                .map(|p| p.rsplit('/').next().unwrap_or(p).to_string())
                .unwrap_or_else(|| "file".to_string())
        };

        match call.name.as_str() {
            EDIT_FILE => format!("Editing {}...", file()),
            READ_FILE => format!("Reading {}...", file()),
            GET_FILE_TREE => "Scanning workspace...".to_string(),
            other => format!("Running {}...", other),
        }
    }

    /// Dispatch one call and build its result
    pub async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        debug!("Dispatching tool '{}' with args: {}", call.name, call.args);

        let args = match ToolArgs::parse(&call.name, &call.args) {
            Ok(args) => args,
            Err(message) => {
                warn!(tool = %call.name, "Rejected tool call: {}", message);
                return ToolOutcome {
                    result: ToolResult::error(call, message),
                    edited_path: None,
                };
            }
        };

        match args {
            ToolArgs::EditFile { path, content } => self.edit_file(call, &path, &content).await,
            ToolArgs::ReadFile { path } => ToolOutcome {
                result: self.read_file(call, &path).await,
                edited_path: None,
            },
            ToolArgs::GetFileTree => ToolOutcome {
                result: self.get_file_tree(call).await,
                edited_path: None,
            },
        }
    }

    async fn edit_file(&self, call: &ToolCall, path: &str, content: &str) -> ToolOutcome {
        let written = match self.workspace.write(path, content).await {
            Ok(written) => written,
            Err(e) => {
                warn!(path, error = %e, "edit_file failed");
                return ToolOutcome {
                    result: ToolResult::error(call, failure_message("write", path, &e)),
                    edited_path: None,
                };
            }
        };

        if self.capture_on_edit {
            capture::capture_quietly(self.memory.as_ref(), &written, content).await;
        }

        ToolOutcome {
            result: ToolResult::new(
                &call.id,
                &call.name,
                json!({
                    "success": true,
                    "path": written,
                    "message": format!("Successfully updated {}", written),
                }),
            ),
            edited_path: Some(written),
        }
    }

    async fn read_file(&self, call: &ToolCall, path: &str) -> ToolResult {
        match self.workspace.read(path).await {
            Ok(Some(content)) => {
                ToolResult::new(&call.id, &call.name, json!({"path": path, "content": content}))
            }
            Ok(None) => ToolResult::error(call, format!("File not found: {}", path)),
            Err(e) => ToolResult::error(call, failure_message("read", path, &e)),
        }
    }

    async fn get_file_tree(&self, call: &ToolCall) -> ToolResult {
        let tree = match self.workspace.render_tree().await {
            Ok(tree) => tree,
            Err(e) => {
                warn!(error = %e, "Failed to render workspace tree");
                format!("(unable to read workspace: {})", e)
            }
        };
        ToolResult::new(&call.id, &call.name, json!({ "tree": tree }))
    }
}

/// Tool-level message for a workspace failure. Absolute paths stay out of it.
fn failure_message(action: &str, path: &str, error: &EngineError) -> String {
    match error {
        EngineError::PathDenied(_)
        | EngineError::PathOutsideWorkspace(_)
        | EngineError::PathCanonicalization(_, _) => format!("Access denied: {}", path),
        EngineError::Io(e) => format!("Failed to {} {}: {}", action, path, e),
        other => format!("Failed to {} {}: {}", action, path, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::memory::MemoryType;
    use tempfile::TempDir;

    async fn executor(temp: &TempDir) -> (ToolExecutor, Arc<dyn MemoryStore>) {
        let root = temp.path().join("workspace");
        std::fs::create_dir_all(&root).unwrap();
        let workspace = Arc::new(FsWorkspace::new(&root, vec!["ideas".to_string()]).unwrap());
        let db = Database::new(&temp.path().join("forge.db")).await.unwrap();
        let memory: Arc<dyn MemoryStore> = Arc::new(db.memories());
        (
            ToolExecutor::new(workspace, Arc::clone(&memory), true),
            memory,
        )
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::new("call_1", name, args)
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            ToolArgs::parse(READ_FILE, &json!({"path": "a.md"})),
            Ok(ToolArgs::ReadFile {
                path: "a.md".to_string()
            })
        );
        assert_eq!(
            ToolArgs::parse(GET_FILE_TREE, &Value::Null),
            Ok(ToolArgs::GetFileTree)
        );

        let missing = ToolArgs::parse(EDIT_FILE, &json!({"path": "a.md"})).unwrap_err();
        assert!(missing.starts_with("Invalid arguments for edit_file:"));
        assert!(missing.contains("content"));

        assert_eq!(
            ToolArgs::parse("delete_file", &json!({})),
            Err("Unknown function: delete_file".to_string())
        );
    }

    #[test]
    fn test_declarations() {
        let declarations = ToolExecutor::declarations();
        let names: Vec<&str> = declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![EDIT_FILE, READ_FILE, GET_FILE_TREE]);
        assert_eq!(declarations[0].required_params(), vec!["content", "path"]);
        assert!(declarations[2].parameters.is_empty());
    }

    #[test]
    fn test_describe_action() {
        assert_eq!(
            ToolExecutor::describe_action(&call(EDIT_FILE, json!({"path": "ideas/x/plan.md"}))),
            "Editing plan.md..."
        );
        assert_eq!(
            ToolExecutor::describe_action(&call(READ_FILE, json!({"path": "a.md"}))),
            "Reading a.md..."
        );
        assert_eq!(
            ToolExecutor::describe_action(&call(GET_FILE_TREE, json!({}))),
            "Scanning workspace..."
        );
        assert_eq!(
            ToolExecutor::describe_action(&call("search", json!({}))),
            "Running search..."
        );
    }

    #[tokio::test]
    async fn test_edit_then_read() {
        let temp = TempDir::new().unwrap();
        let (executor, _) = executor(&temp).await;

        let edited = executor
            .execute(&call(
                EDIT_FILE,
                json!({"path": "ideas/acme/plan.md", "content": "# Plan\nship it"}),
            ))
            .await;
        assert_eq!(edited.edited_path.as_deref(), Some("ideas/acme/plan.md"));
        assert_eq!(edited.result.payload["success"], true);
        assert_eq!(edited.result.call_id, "call_1");

        let read = executor
            .execute(&call(READ_FILE, json!({"path": "ideas/acme/plan.md"})))
            .await;
        assert_eq!(read.result.payload["content"], "# Plan\nship it");
        assert!(read.edited_path.is_none());
    }

    #[tokio::test]
    async fn test_read_missing_is_tool_error() {
        let temp = TempDir::new().unwrap();
        let (executor, _) = executor(&temp).await;

        let outcome = executor
            .execute(&call(READ_FILE, json!({"path": "nope.md"})))
            .await;
        assert!(outcome.result.is_error());
        assert_eq!(outcome.result.payload["error"], "File not found: nope.md");
    }

    #[tokio::test]
    async fn test_edit_outside_workspace_is_tool_error() {
        let temp = TempDir::new().unwrap();
        let (executor, _) = executor(&temp).await;

        let outcome = executor
            .execute(&call(
                EDIT_FILE,
                json!({"path": "../outside.md", "content": "x"}),
            ))
            .await;
        assert!(outcome.result.is_error());
        assert_eq!(outcome.result.payload["error"], "Access denied: ../outside.md");
        assert!(outcome.edited_path.is_none());
        assert!(!temp.path().join("outside.md").exists());
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_calls() {
        let temp = TempDir::new().unwrap();
        let (executor, _) = executor(&temp).await;

        let unknown = executor.execute(&call("rm_rf", json!({}))).await;
        assert_eq!(unknown.result.payload["error"], "Unknown function: rm_rf");

        let invalid = executor
            .execute(&call(READ_FILE, json!({"path": 42})))
            .await;
        assert!(invalid.result.payload["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid arguments for read_file"));
    }

    #[tokio::test]
    async fn test_file_tree() {
        let temp = TempDir::new().unwrap();
        let (executor, _) = executor(&temp).await;

        let empty = executor.execute(&call(GET_FILE_TREE, json!({}))).await;
        assert_eq!(empty.result.payload["tree"], "(empty workspace)");

        executor
            .execute(&call(EDIT_FILE, json!({"path": "notes.md", "content": "n"})))
            .await;
        let tree = executor.execute(&call(GET_FILE_TREE, json!({}))).await;
        assert_eq!(tree.result.payload["tree"], "notes.md");
    }

    #[tokio::test]
    async fn test_edit_captures_memory_once_per_path() {
        let temp = TempDir::new().unwrap();
        let (executor, memory) = executor(&temp).await;

        let path = "acme/decisions/pricing.md";
        executor
            .execute(&call(
                EDIT_FILE,
                json!({"path": path, "content": "# Charge per seat\n"}),
            ))
            .await;
        executor
            .execute(&call(
                EDIT_FILE,
                json!({"path": path, "content": "# Charge per workspace\n"}),
            ))
            .await;

        let items = memory.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].memory_type, MemoryType::Decision);
        assert_eq!(items[0].summary, "Charge per workspace");
        assert_eq!(items[0].entities.ideas, vec!["acme"]);
        assert_eq!(items[0].entities.artifacts, vec![path]);
        assert_eq!(items[0].source.reference.as_deref(), Some(path));
    }

    #[tokio::test]
    async fn test_edit_outside_categories_captures_nothing() {
        let temp = TempDir::new().unwrap();
        let (executor, memory) = executor(&temp).await;

        executor
            .execute(&call(
                EDIT_FILE,
                json!({"path": "inbox/todo.md", "content": "buy milk"}),
            ))
            .await;
        assert!(memory.list().await.unwrap().is_empty());
    }
}

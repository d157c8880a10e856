//! Canonical conversation types
//!
//! These are the provider-independent shapes the orchestration loop stores in
//! a session's history. Provider adapters translate them to and from their
//! own wire formats; nothing else in the engine sees a backend-specific shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who produced a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Message typed by the user
    User,

    /// Response produced by the model
    Model,

    /// Results of the tool calls requested by the preceding model turn
    ToolResult,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Correlation id. Backends without explicit ids get positional ones.
    pub id: String,

    /// Name of the tool to call
    pub name: String,

    /// Arguments as produced by the model (a JSON object when well-formed)
    pub args: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// The outcome of one tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// Id of the `ToolCall` this answers
    pub call_id: String,

    /// Name of the tool that ran
    pub name: String,

    /// Structured result. Tool-level errors carry an `error` field.
    pub payload: serde_json::Value,
}

impl ToolResult {
    /// Create a new tool result
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            payload,
        }
    }

    /// Create a tool-level error result answering `call`
    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self::new(
            call.id.clone(),
            call.name.clone(),
            serde_json::json!({ "error": message.into() }),
        )
    }

    /// Whether the payload is a tool-level error
    pub fn is_error(&self) -> bool {
        self.payload.get("error").is_some()
    }
}

/// One block of a turn's content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text
    Text { value: String },

    /// The model asks for a tool to run
    ToolCall(ToolCall),

    /// A tool's answer
    ToolResult(ToolResult),
}

impl ContentBlock {
    /// Create a text block
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }
}

/// One entry in a session's canonical history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: Vec<ContentBlock>,
}

impl ConversationTurn {
    /// Create a user turn holding a single text block
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Create a model turn from its blocks
    pub fn model(content: Vec<ContentBlock>) -> Self {
        Self {
            role: TurnRole::Model,
            content,
        }
    }

    /// Create a tool result turn, preserving the order of `results`
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: TurnRole::ToolResult,
            content: results.into_iter().map(ContentBlock::ToolResult).collect(),
        }
    }

    /// All text blocks joined by newlines, in order
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { value } => Some(value.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool calls in the order the model produced them
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Tool results in stored order
    pub fn results(&self) -> Vec<&ToolResult> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult(result) => Some(result),
                _ => None,
            })
            .collect()
    }
}

/// JSON type of a declared tool parameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// JSON Schema spelling (`"string"`, `"number"`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

/// Declaration of a single tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

impl ParameterSpec {
    /// A required string parameter
    pub fn required_string(description: impl Into<String>) -> Self {
        Self {
            param_type: ParamType::String,
            description: description.into(),
            required: true,
        }
    }
}

/// Provider-independent description of a callable tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl ToolDeclaration {
    /// Create a declaration with no parameters
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }

    /// Names of the required parameters, sorted
    pub fn required_params(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_joins_blocks_with_newline() {
        let turn = ConversationTurn::model(vec![
            ContentBlock::text("first"),
            ContentBlock::ToolCall(ToolCall::new("c1", "get_file_tree", json!({}))),
            ContentBlock::text("second"),
        ]);
        assert_eq!(turn.text(), "first\nsecond");
    }

    #[test]
    fn test_tool_calls_keep_model_order() {
        let turn = ConversationTurn::model(vec![
            ContentBlock::ToolCall(ToolCall::new("b", "read_file", json!({"path": "b.md"}))),
            ContentBlock::ToolCall(ToolCall::new("a", "read_file", json!({"path": "a.md"}))),
        ]);
        let ids: Vec<&str> = turn.tool_calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_tool_result_error_detection() {
        let call = ToolCall::new("c1", "read_file", json!({"path": "x"}));
        let failed = ToolResult::error(&call, "File not found: x");
        assert!(failed.is_error());
        assert_eq!(failed.call_id, "c1");

        let ok = ToolResult::new("c1", "read_file", json!({"path": "x", "content": ""}));
        assert!(!ok.is_error());
    }

    #[test]
    fn test_content_block_serialization_is_tagged() {
        let block = ContentBlock::ToolCall(ToolCall::new("c1", "edit_file", json!({})));
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));

        let parsed: ContentBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, block);
    }

    #[test]
    fn test_required_params() {
        let decl = ToolDeclaration::new("edit_file", "Write a file")
            .with_param("path", ParameterSpec::required_string("Path"))
            .with_param(
                "note",
                ParameterSpec {
                    param_type: ParamType::String,
                    description: "Optional".to_string(),
                    required: false,
                },
            );
        assert_eq!(decl.required_params(), vec!["path"]);
    }
}

use super::{status_error, transport_error, LLMProvider, ModelTurn};
use crate::config::AnthropicConfig;
use crate::secrets::{provider_key_name, SecretCache};
use async_trait::async_trait;
use sdk::errors::UpstreamError;
use sdk::types::{ContentBlock, ConversationTurn, ToolCall, ToolDeclaration, TurnRole};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Response body of the Messages API
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Option<Vec<ResponseBlock>>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unsupported,
}

pub struct AnthropicProvider {
    config: AnthropicConfig,
    max_tokens: u32,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig, max_tokens: u32, secret_cache: Arc<SecretCache>) -> Self {
        Self {
            config,
            max_tokens,
            secret_cache,
            client: reqwest::Client::new(),
        }
    }

    /// Render the canonical history as Messages API `messages`
    ///
    /// Tool results travel in a `user` message. Consecutive messages with the
    /// same role are merged because the API requires strict alternation.
    fn encode_history(history: &[ConversationTurn]) -> Vec<Value> {
        let mut messages: Vec<(String, Vec<Value>)> = Vec::new();

        for turn in history {
            let (role, blocks) = match turn.role {
                TurnRole::User => ("user", Self::text_blocks(turn)),
                TurnRole::Model => {
                    let blocks = turn
                        .content
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::Text { value } if !value.is_empty() => {
                                Some(json!({"type": "text", "text": value}))
                            }
                            ContentBlock::ToolCall(call) => Some(json!({
                                "type": "tool_use",
                                "id": call.id,
                                "name": call.name,
                                "input": object_or_empty(&call.args),
                            })),
                            _ => None,
                        })
                        .collect();
                    ("assistant", blocks)
                }
                TurnRole::ToolResult => {
                    let blocks = turn
                        .results()
                        .into_iter()
                        .map(|result| {
                            json!({
                                "type": "tool_result",
                                "tool_use_id": result.call_id,
                                "content": result.payload.to_string(),
                                "is_error": result.is_error(),
                            })
                        })
                        .collect();
                    ("user", blocks)
                }
            };

            if blocks.is_empty() {
                continue;
            }

            match messages.last_mut() {
                Some((last_role, content)) if *last_role == role => content.extend(blocks),
                _ => messages.push((role.to_string(), blocks)),
            }
        }

        messages
            .into_iter()
            .map(|(role, content)| json!({"role": role, "content": content}))
            .collect()
    }

    fn text_blocks(turn: &ConversationTurn) -> Vec<Value> {
        turn.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { value } if !value.is_empty() => {
                    Some(json!({"type": "text", "text": value}))
                }
                _ => None,
            })
            .collect()
    }

    fn decode_response(data: MessagesResponse) -> super::Result<ModelTurn> {
        let content = data.content.ok_or_else(|| {
            UpstreamError::NoCandidate("No content array in response".to_string())
        })?;

        let blocks = content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentBlock::Text { value: text }),
                ResponseBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolCall(ToolCall::new(id, name, input)))
                }
                ResponseBlock::Unsupported => None,
            })
            .collect();

        Ok(ModelTurn {
            blocks,
            stop_reason: data.stop_reason,
        })
    }
}

fn object_or_empty(value: &Value) -> Value {
    if value.is_object() {
        value.clone()
    } else {
        json!({})
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn declare_tools(&self, tools: &[ToolDeclaration]) -> Value {
        let declared: Vec<Value> = tools
            .iter()
            .map(|tool| {
                let properties: serde_json::Map<String, Value> = tool
                    .parameters
                    .iter()
                    .map(|(name, spec)| {
                        (
                            name.clone(),
                            json!({
                                "type": spec.param_type.as_str(),
                                "description": spec.description,
                            }),
                        )
                    })
                    .collect();

                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": {
                        "type": "object",
                        "properties": properties,
                        "required": tool.required_params(),
                    }
                })
            })
            .collect();

        Value::Array(declared)
    }

    async fn check_health(&self) -> bool {
        self.secret_cache.has_secret(&provider_key_name(self.name()))
    }

    fn is_terminal(&self, turn: &ModelTurn) -> bool {
        match turn.stop_reason.as_deref() {
            Some("tool_use") => false,
            Some(_) => true,
            None => !turn.has_tool_calls(),
        }
    }

    async fn generate(
        &self,
        system_prompt: &str,
        history: &[ConversationTurn],
        tools: &[ToolDeclaration],
    ) -> super::Result<ModelTurn> {
        let api_key = self
            .secret_cache
            .get_secret(&provider_key_name(self.name()))
            .map_err(|e| UpstreamError::AuthenticationFailed(e.to_string()))?
            .ok_or_else(|| {
                UpstreamError::AuthenticationFailed("No Anthropic API key configured".to_string())
            })?;

        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));

        let mut payload = json!({
            "model": self.config.model,
            "max_tokens": self.max_tokens,
            "system": system_prompt,
            "messages": Self::encode_history(history),
        });
        if !tools.is_empty() {
            payload["tools"] = self.declare_tools(tools);
        }

        debug!(
            model = %self.config.model,
            turns = history.len(),
            "Sending Anthropic request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key.unsecure())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(self.name(), status, &text));
        }

        let data: MessagesResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        Self::decode_response(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretManager;
    use sdk::types::{ParameterSpec, ToolResult};

    fn provider() -> AnthropicProvider {
        let cache = SecretCache::new(Arc::new(SecretManager::new("forge-test")));
        AnthropicProvider::new(AnthropicConfig::default(), 1024, Arc::new(cache))
    }

    #[test]
    fn test_declare_tools_uses_input_schema() {
        let tools = vec![ToolDeclaration::new("read_file", "Read a file")
            .with_param("path", ParameterSpec::required_string("Path"))];

        let declared = provider().declare_tools(&tools);
        assert_eq!(declared[0]["name"], "read_file");
        assert_eq!(declared[0]["input_schema"]["type"], "object");
        assert_eq!(
            declared[0]["input_schema"]["properties"]["path"]["type"],
            "string"
        );
        assert_eq!(declared[0]["input_schema"]["required"], json!(["path"]));
    }

    #[test]
    fn test_history_encoding_correlates_ids() {
        let call = ToolCall::new("toolu_1", "read_file", json!({"path": "a.md"}));
        let history = vec![
            ConversationTurn::user("read a.md"),
            ConversationTurn::model(vec![
                ContentBlock::text("Looking"),
                ContentBlock::ToolCall(call.clone()),
            ]),
            ConversationTurn::tool_results(vec![ToolResult::error(&call, "File not found: a.md")]),
        ];

        let messages = AnthropicProvider::encode_history(&history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][1]["id"], "toolu_1");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(messages[2]["content"][0]["is_error"], true);
    }

    #[test]
    fn test_history_encoding_merges_consecutive_user_messages() {
        let call = ToolCall::new("toolu_1", "get_file_tree", json!({}));
        let history = vec![
            ConversationTurn::user("hi"),
            ConversationTurn::model(vec![ContentBlock::ToolCall(call.clone())]),
            ConversationTurn::tool_results(vec![ToolResult::error(
                &call,
                "Tool call was not completed",
            )]),
            ConversationTurn::user("again"),
        ];

        let messages = AnthropicProvider::encode_history(&history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_is_terminal_prefers_stop_reason() {
        let provider = provider();
        let with_call = ModelTurn::new(vec![ContentBlock::ToolCall(ToolCall::new(
            "t",
            "read_file",
            json!({}),
        ))]);

        assert!(!provider.is_terminal(&with_call.clone().with_stop_reason("tool_use")));
        assert!(provider.is_terminal(&with_call.clone().with_stop_reason("end_turn")));
        assert!(!provider.is_terminal(&with_call));
        assert!(provider.is_terminal(&ModelTurn::new(vec![ContentBlock::text("hi")])));
    }

    #[test]
    fn test_decode_response_without_content() {
        let data: MessagesResponse = serde_json::from_value(json!({"stop_reason": "end_turn"})).unwrap();
        assert!(matches!(
            AnthropicProvider::decode_response(data),
            Err(UpstreamError::NoCandidate(_))
        ));
    }

    #[test]
    fn test_decode_response_skips_unknown_blocks() {
        let data: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Done"},
                {"type": "tool_use", "id": "toolu_9", "name": "get_file_tree", "input": {}}
            ],
            "stop_reason": "tool_use"
        }))
        .unwrap();

        let turn = AnthropicProvider::decode_response(data).unwrap();
        assert_eq!(turn.blocks.len(), 2);
        assert_eq!(turn.tool_calls()[0].id, "toolu_9");
    }
}

use super::{status_error, transport_error, LLMProvider, ModelTurn};
use crate::config::GeminiConfig;
use crate::secrets::{provider_key_name, SecretCache};
use async_trait::async_trait;
use sdk::errors::UpstreamError;
use sdk::types::{ContentBlock, ConversationTurn, ToolCall, ToolDeclaration, TurnRole};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub struct GeminiProvider {
    config: GeminiConfig,
    max_tokens: u32,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig, max_tokens: u32, secret_cache: Arc<SecretCache>) -> Self {
        Self {
            config,
            max_tokens,
            secret_cache,
            client: reqwest::Client::new(),
        }
    }

    /// Render the canonical history as `contents`
    ///
    /// Function responses carry no id. The backend pairs them with the
    /// preceding `functionCall` parts by position, which the canonical
    /// tool result turn already preserves.
    fn encode_history(history: &[ConversationTurn]) -> Vec<Value> {
        history
            .iter()
            .filter_map(|turn| {
                let (role, parts): (&str, Vec<Value>) = match turn.role {
                    TurnRole::User => (
                        "user",
                        turn.content
                            .iter()
                            .filter_map(|block| match block {
                                ContentBlock::Text { value } if !value.is_empty() => {
                                    Some(json!({"text": value}))
                                }
                                _ => None,
                            })
                            .collect(),
                    ),
                    TurnRole::Model => (
                        "model",
                        turn.content
                            .iter()
                            .filter_map(|block| match block {
                                ContentBlock::Text { value } if !value.is_empty() => {
                                    Some(json!({"text": value}))
                                }
                                ContentBlock::ToolCall(call) => Some(json!({
                                    "functionCall": {"name": call.name, "args": call.args}
                                })),
                                _ => None,
                            })
                            .collect(),
                    ),
                    TurnRole::ToolResult => (
                        "user",
                        turn.results()
                            .into_iter()
                            .map(|result| {
                                let response = if result.payload.is_object() {
                                    result.payload.clone()
                                } else {
                                    json!({"result": result.payload})
                                };
                                json!({
                                    "functionResponse": {"name": result.name, "response": response}
                                })
                            })
                            .collect(),
                    ),
                };

                if parts.is_empty() {
                    None
                } else {
                    Some(json!({"role": role, "parts": parts}))
                }
            })
            .collect()
    }

    fn decode_response(data: &Value) -> super::Result<ModelTurn> {
        let candidate = data
            .get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| UpstreamError::NoCandidate("No candidates in response".to_string()))?;

        let finish_reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .map(str::to_string);

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| {
                UpstreamError::NoCandidate(format!(
                    "No content in candidate (finish reason: {})",
                    finish_reason.as_deref().unwrap_or("unknown")
                ))
            })?;

        let mut blocks = Vec::with_capacity(parts.len());
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                blocks.push(ContentBlock::text(text));
            } else if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| UpstreamError::Parse("functionCall without name".to_string()))?;
                let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
                // Ids are assigned when the turn is encoded
                blocks.push(ContentBlock::ToolCall(ToolCall::new("", name, args)));
            }
        }

        Ok(ModelTurn {
            blocks,
            stop_reason: finish_reason,
        })
    }
}

/// Gemini spells schema types in upper case
fn gemini_type(param_type: &sdk::types::ParamType) -> String {
    param_type.as_str().to_uppercase()
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn declare_tools(&self, tools: &[ToolDeclaration]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                let mut declaration = json!({
                    "name": tool.name,
                    "description": tool.description,
                });

                if !tool.parameters.is_empty() {
                    let properties: serde_json::Map<String, Value> = tool
                        .parameters
                        .iter()
                        .map(|(name, spec)| {
                            (
                                name.clone(),
                                json!({
                                    "type": gemini_type(&spec.param_type),
                                    "description": spec.description,
                                }),
                            )
                        })
                        .collect();

                    declaration["parameters"] = json!({
                        "type": "OBJECT",
                        "properties": properties,
                        "required": tool.required_params(),
                    });
                }

                declaration
            })
            .collect();

        json!({ "functionDeclarations": declarations })
    }

    async fn check_health(&self) -> bool {
        self.secret_cache.has_secret(&provider_key_name(self.name()))
    }

    /// Give every id-less call a positional id so results can be paired later
    fn encode_model_turn(&self, turn: ModelTurn) -> ConversationTurn {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let mut position = 0;

        let blocks = turn
            .blocks
            .into_iter()
            .map(|block| match block {
                ContentBlock::ToolCall(mut call) => {
                    if call.id.is_empty() {
                        call.id = format!("call_{}_{}", &nonce[..8], position);
                    }
                    position += 1;
                    ContentBlock::ToolCall(call)
                }
                other => other,
            })
            .collect();

        ConversationTurn::model(blocks)
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
                UpstreamError::AuthenticationFailed("No Gemini API key configured".to_string())
            })?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
        );

        let mut payload = json!({
            "systemInstruction": {"parts": [{"text": system_prompt}]},
            "contents": Self::encode_history(history),
            "generationConfig": {"maxOutputTokens": self.max_tokens},
        });
        if !tools.is_empty() {
            payload["tools"] = json!([self.declare_tools(tools)]);
        }

        debug!(
            model = %self.config.model,
            turns = history.len(),
            "Sending Gemini request"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key.unsecure())])
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

        let data: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        Self::decode_response(&data)
    }
}

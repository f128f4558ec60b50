//! OpenAI 兼容 API 客户端
//!
//! 通过 reqwest 调用任意 OpenAI 兼容的 /chat/completions 端点（可配置 base_url），使用原生 tool calling：
//! 请求携带 `tools`，回复中的 `tool_calls` 转为 ToolCallRequest，观察结果以 role=tool 回传。

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, ModelReply};
use crate::memory::{Message, Role};
use crate::tools::{ToolCallRequest, ToolSchema};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| LlmError::Auth("OPENAI_API_KEY not set".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            usage: TokenUsage::new(),
        })
    }

    fn request_body(&self, messages: &[Message], tools: Option<&[ToolSchema]>) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": to_wire_messages(messages),
        });
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = Value::Array(tools.iter().map(to_wire_tool).collect());
        }
        body
    }
}

fn to_wire_tool(schema: &ToolSchema) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": schema.parameters_json(),
        }
    })
}

/// Message 转 API 格式
///
/// role=tool 的消息必须紧跟在发出对应调用的 assistant 消息之后；上下文裁剪可能把该 assistant 消息省略，
/// 这类孤立的观察结果改以 user 消息传递。
fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
    let mut pending: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        let wire = match m.role {
            Role::Assistant if !m.tool_calls.is_empty() => {
                pending = m.tool_calls.iter().map(|c| c.id.as_str()).collect();
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.arguments_json() },
                        })
                    })
                    .collect();
                let content = if m.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(m.content.clone())
                };
                serde_json::json!({ "role": "assistant", "content": content, "tool_calls": calls })
            }
            Role::Tool => match m.tool_call_id.as_deref() {
                Some(id) if pending.contains(id) => {
                    serde_json::json!({ "role": "tool", "tool_call_id": id, "content": m.content })
                }
                _ => serde_json::json!({
                    "role": "user",
                    "content": format!("[tool result] {}", m.content),
                }),
            },
            role => {
                pending.clear();
                serde_json::json!({ "role": role.as_str(), "content": m.content })
            }
        };
        out.push(wire);
    }
    out
}

/// 解析回复；arguments 不是合法 JSON 时原样包进 `input`，交给工具按参数错误处理
fn parse_reply(response: ChatResponse) -> Result<ModelReply, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("response has no choices".to_string()))?;
    let content = choice.message.content.unwrap_or_default();
    if choice.message.tool_calls.is_empty() {
        return Ok(ModelReply::DirectAnswer(content));
    }
    let calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|tc| {
            let args = if tc.function.arguments.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments))
            };
            ToolCallRequest::with_id(tc.id, tc.function.name, args)
        })
        .collect();
    Ok(ModelReply::ToolCalls { content, calls })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn infer(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ModelReply, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, tools))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "LLM request failed");
            return Err(LlmError::from_status(status.as_u16(), body, retry_after_ms));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        parse_reply(parsed)
    }
}

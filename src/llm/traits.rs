//! LLM 客户端抽象
//!
//! 模型能力是黑盒：给定消息序列与可选工具声明，返回直接回答或一批工具调用请求。
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::{ToolCallRequest, ToolSchema};

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,

    #[error("Rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("LLM server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),
}

impl LlmError {
    /// 瞬时错误：超时、限流、5xx、网络
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout | LlmError::RateLimited { .. } | LlmError::Server { .. } | LlmError::Network(_)
        )
    }

    /// 根据 HTTP 状态码分类
    pub fn from_status(status: u16, body: String, retry_after_ms: Option<u64>) -> Self {
        match status {
            401 | 403 => LlmError::Auth(body),
            408 => LlmError::Timeout,
            429 => LlmError::RateLimited {
                retry_after_ms: retry_after_ms.unwrap_or(1000),
            },
            500..=599 => LlmError::Server { status, message: body },
            _ => LlmError::InvalidRequest(format!("HTTP {status}: {body}")),
        }
    }
}

/// 模型回复
#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    /// 无工具调用的最终文本
    DirectAnswer(String),
    /// 一批有序的工具调用；content 为模型随调用给出的推理文本（可为空）
    ToolCalls {
        content: String,
        calls: Vec<ToolCallRequest>,
    },
}

impl ModelReply {
    pub fn answer(text: impl Into<String>) -> Self {
        ModelReply::DirectAnswer(text.into())
    }

    pub fn tool_call(call: ToolCallRequest) -> Self {
        ModelReply::ToolCalls {
            content: String::new(),
            calls: vec![call],
        }
    }

    /// 回复中的文本部分
    pub fn text(&self) -> &str {
        match self {
            ModelReply::DirectAnswer(text) => text,
            ModelReply::ToolCalls { content, .. } => content,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 推理一步；tools 为 None 或空时模型只能直接回答
    async fn infer(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ModelReply, LlmError>;

    /// 无工具的纯文本补全
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        Ok(self.infer(messages, None).await?.text().to_string())
    }

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

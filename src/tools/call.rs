//! 工具调用请求、失败分类与归一化结果
//!
//! 工具以 `Result<String, ToolError>` 返回，执行器在熔断/重试处理后为每个请求产出恰好一个 ToolCallOutcome。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 一次工具调用请求：能力名 + 命名参数；发出后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// 调用 ID（模型给出的 tool_call_id，缺省时本地生成）
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// args 为 JSON 对象时直接作为参数表；null 视为无参数；其它值包进 `input` 键
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name, args)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        let arguments = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }

    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| "{}".to_string())
    }
}

/// 工具失败分类
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// 瞬时故障：超时、限流、服务端临时错误
    #[error("{0}")]
    Retryable(String),

    /// 限流，带服务端给出的最短等待
    #[error("{message}")]
    RateLimited { message: String, retry_after: Duration },

    /// 永久故障：参数非法、鉴权失败、策略禁止
    #[error("{0}")]
    Permanent(String),

    /// 未分类故障，按永久处理，不重试
    #[error("Unexpected error: {0}")]
    Unclassified(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),

    /// 熔断打开，快速失败（未实际调用）
    #[error("{0} is currently unavailable, please try again later")]
    CircuitOpen(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ToolError::Retryable(_) | ToolError::RateLimited { .. } | ToolError::Timeout(_)
        )
    }

    /// 重试前至少等待多久
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ToolError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// 归一化的调用结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCallOutcome {
    Success { payload: String },
    RetryableFailure { message: String },
    PermanentFailure { message: String },
}

impl ToolCallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallOutcome::Success { .. })
    }

    /// 写回对话的观察文本：成功为 payload，失败为渲染后的错误
    pub fn render(&self) -> String {
        match self {
            ToolCallOutcome::Success { payload } => payload.clone(),
            ToolCallOutcome::RetryableFailure { message } => {
                format!("Error: {message} (all retries exhausted)")
            }
            ToolCallOutcome::PermanentFailure { message } => format!("Error: {message}"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ToolCallOutcome::Success { .. } => "ok",
            ToolCallOutcome::RetryableFailure { .. } => "retryable_failure",
            ToolCallOutcome::PermanentFailure { .. } => "permanent_failure",
        }
    }
}

impl From<Result<String, ToolError>> for ToolCallOutcome {
    fn from(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(payload) => ToolCallOutcome::Success { payload },
            Err(e) if e.is_retryable() => ToolCallOutcome::RetryableFailure {
                message: e.to_string(),
            },
            Err(e) => ToolCallOutcome::PermanentFailure {
                message: e.to_string(),
            },
        }
    }
}

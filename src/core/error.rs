//! Agent 顶层错误类型
//!
//! 工具层失败不会出现在这里：它们在执行器内归一化为 ToolCallOutcome，作为观察文本回写对话。

use thiserror::Error;

use crate::llm::LlmError;
use crate::workflow::WorkflowError;

#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型推理失败（不在工具弹性范围内，交给调用方处理）
    #[error("LLM error: {0}")]
    Model(#[from] LlmError),

    /// 执行计划非法（环、缺失依赖等）
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}

//! ReAct 过程事件：用于流式展示步数、工具调用、观察与最终回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// ReAct 步数更新（当前第几步）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用 LLM 思考
    Thinking,
    /// 模型随工具调用给出的推理文本
    ThinkingContent { text: String },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具执行失败（记录到 Working Memory）
    ToolFailure { tool: String, reason: String },
    /// 最终回复
    Answer { text: String },
    /// 达到步数上限仍未完成
    Exhausted { iterations: usize },
}

//! 短期记忆：对话条目
//!
//! 对话按插入顺序追加，插入顺序即对话顺序；由 ContextWindow 独占持有。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::ToolCallRequest;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// 单条对话条目（ConversationEntry）
///
/// assistant 条目可携带本轮发出的工具调用；tool 条目通过 tool_call_id 对应到发起它的调用。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// 工具观察结果（role = tool）
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// assistant 发出的工具调用请求；content 为可读摘要，保留模型的推理轨迹
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = calls;
        msg
    }

    /// 参与 token 计数的文本：content 加上工具调用的名称与参数
    pub fn accounted_text(&self) -> String {
        if self.tool_calls.is_empty() {
            return self.content.clone();
        }
        let mut text = self.content.clone();
        for call in &self.tool_calls {
            text.push('\n');
            text.push_str(&call.name);
            text.push(' ');
            text.push_str(&call.arguments_json());
        }
        text
    }
}

/// 对话日志：只追加，按插入顺序保存
#[derive(Clone, Debug, Default)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 最近 n 条（用于持久化）
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

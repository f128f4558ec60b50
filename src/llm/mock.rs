//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预置回复；脚本耗尽后若设置了 always 则一直返回该回复，
//! 否则回显最后一条 User 消息作为直接回答。记录每次调用收到的消息，便于断言。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, ModelReply};
use crate::memory::{Message, Role};
use crate::tools::ToolSchema;

/// 一次被记录的推理调用
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    /// 调用时提供的工具名
    pub tools: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    always: Option<Result<ModelReply, LlmError>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn with_replies(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        let client = Self::new();
        for reply in replies {
            client.push_reply(reply);
        }
        client
    }

    /// 脚本耗尽后始终返回该回复
    pub fn always(reply: ModelReply) -> Self {
        Self {
            always: Some(Ok(reply)),
            ..Self::default()
        }
    }

    /// 始终返回该错误
    pub fn failing(error: LlmError) -> Self {
        Self {
            always: Some(Err(error)),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, reply: ModelReply) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(reply));
    }

    pub fn push_error(&self, error: LlmError) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn infer(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ModelReply, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                messages: messages.to_vec(),
                tools: tools
                    .unwrap_or_default()
                    .iter()
                    .map(|t| t.name.clone())
                    .collect(),
            });

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(next) = scripted.or_else(|| self.always.clone()) {
            return next;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(ModelReply::DirectAnswer(format!("Echo from Mock: {last_user}")))
    }
}

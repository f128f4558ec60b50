//! ReAct 主循环
//!
//! REASONING -> (ACTING -> OBSERVING -> REASONING)* -> DONE | EXHAUSTED。
//! 每轮用 ContextWindow 渲染预算内的消息交给模型；模型请求工具时先把 assistant 的调用条目写入对话，
//! 再按顺序逐个经 ToolExecutor 执行，每个请求写回一条 role=tool 的观察。工具失败只作为观察文本，
//! 不中断循环；只有步数上限是硬性终止，返回明确的未完成结果而不是错误。
//! 可选 event_tx 推送过程事件，可选 cancel_token 在下一轮推理前终止。

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use serde::Deserialize;

use crate::core::AgentError;
use crate::llm::{LlmClient, ModelReply};
use crate::memory::{ContextWindow, Message, WorkingMemory};
use crate::react::ReactEvent;
use crate::tools::ToolExecutor;

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI agent that can use tools to complete tasks.

For each step:
1. Think about what you need to do next
2. Call a tool if needed, or provide your final answer
3. Observe the result and continue

When you have enough information to answer the user's question, respond directly without calling more tools.
Be concise and helpful.";

/// [react] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReactConfig {
    /// 单个任务的最大推理轮数
    pub max_iterations: usize,
    pub system_prompt: String,
    /// 是否在 system 消息中附带长期事实摘要
    pub include_facts: bool,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            include_facts: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactStatus {
    Done,
    Exhausted,
}

/// 循环结果：终态、最终文本、实际推理轮数、执行过的工具调用数
#[derive(Debug, Clone)]
pub struct ReactOutcome {
    pub status: ReactStatus,
    pub answer: String,
    pub iterations: usize,
    pub tool_calls: usize,
}

impl ReactOutcome {
    pub fn is_done(&self) -> bool {
        self.status == ReactStatus::Done
    }
}

/// 未完成时的结果文本
pub fn exhausted_message(max_iterations: usize) -> String {
    format!("Error: Agent did not complete task within {max_iterations} iterations")
}

/// ReAct 循环（单次任务）
pub struct ReactLoop<'a> {
    llm: &'a dyn LlmClient,
    executor: &'a ToolExecutor,
    config: ReactConfig,
    cancel_token: Option<CancellationToken>,
    event_tx: Option<&'a mpsc::UnboundedSender<ReactEvent>>,
}

impl<'a> ReactLoop<'a> {
    pub fn new(llm: &'a dyn LlmClient, executor: &'a ToolExecutor, config: ReactConfig) -> Self {
        Self {
            llm,
            executor,
            config,
            cancel_token: None,
            event_tx: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_event_tx(mut self, tx: &'a mpsc::UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token.as_ref().is_some_and(|t| t.is_cancelled())
    }

    async fn reason(&self, messages: &[Message]) -> Result<ModelReply, AgentError> {
        let schemas = self.executor.schemas();
        let tools = (!schemas.is_empty()).then_some(schemas.as_slice());
        let infer = self.llm.infer(messages, tools);
        let reply = match &self.cancel_token {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(AgentError::Cancelled),
                reply = infer => reply,
            },
            None => infer.await,
        };
        Ok(reply?)
    }

    /// 执行任务：task 作为 user 条目追加到 window，循环直到直接回答或达到步数上限
    pub async fn run(
        &self,
        window: &mut ContextWindow,
        working: &mut WorkingMemory,
        task: &str,
    ) -> Result<ReactOutcome, AgentError> {
        let max_steps = self.config.max_iterations;
        working.set_goal(task);
        window.push(Message::user(task));
        let mut tool_calls = 0usize;

        for step in 1..=max_steps {
            if self.is_cancelled() {
                tracing::info!(step, "react loop cancelled");
                return Err(AgentError::Cancelled);
            }
            self.emit(ReactEvent::StepUpdate { step, max_steps });

            let messages = window.render(&self.config.system_prompt, self.config.include_facts);
            self.emit(ReactEvent::Thinking);
            let (content, calls) = match self.reason(&messages).await? {
                ModelReply::DirectAnswer(text) => (text, Vec::new()),
                ModelReply::ToolCalls { content, calls } => (content, calls),
            };

            if calls.is_empty() {
                tracing::info!(step, tool_calls, "react loop done");
                window.push(Message::assistant(content.clone()));
                self.emit(ReactEvent::Answer {
                    text: content.clone(),
                });
                return Ok(ReactOutcome {
                    status: ReactStatus::Done,
                    answer: content,
                    iterations: step,
                    tool_calls,
                });
            }

            if !content.is_empty() {
                self.emit(ReactEvent::ThinkingContent {
                    text: content.clone(),
                });
            }
            tracing::debug!(step, calls = calls.len(), "model requested tool calls");
            window.push(Message::assistant_tool_calls(content, calls.clone()));

            for call in &calls {
                self.emit(ReactEvent::ToolCall {
                    tool: call.name.clone(),
                    args: call.arguments_value(),
                });
                let outcome = self.executor.invoke(call).await;
                tool_calls += 1;

                let observation = outcome.render();
                let preview: String = observation.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
                working.add_attempt(format!("{} -> {}", call.name, preview));
                if outcome.is_success() {
                    self.emit(ReactEvent::Observation {
                        tool: call.name.clone(),
                        preview,
                    });
                } else {
                    working.add_failure(format!("{}: {}", call.name, observation));
                    self.emit(ReactEvent::ToolFailure {
                        tool: call.name.clone(),
                        reason: observation.clone(),
                    });
                }
                window.push(Message::tool(call.id.clone(), observation));
            }
        }

        tracing::warn!(max_steps, tool_calls, "react loop exhausted iteration ceiling");
        self.emit(ReactEvent::Exhausted {
            iterations: max_steps,
        });
        Ok(ReactOutcome {
            status: ReactStatus::Exhausted,
            answer: exhausted_message(max_steps),
            iterations: max_steps,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::core::{CircuitBreaker, RetryPolicy};
    use crate::llm::{LlmError, MockLlmClient};
    use crate::memory::{ContextConfig, Role};
    use crate::tools::{EchoTool, ToolCallRequest, ToolRegistry};

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        ToolExecutor::new(
            registry,
            Arc::new(CircuitBreaker::default()),
            RetryPolicy::no_retry(),
            Duration::from_secs(5),
        )
    }

    fn echo_call(id: &str, text: &str) -> ToolCallRequest {
        ToolCallRequest::with_id(id, "echo", serde_json::json!({ "text": text }))
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let llm = MockLlmClient::with_replies([ModelReply::answer("Paris")]);
        let exec = executor();
        let mut window = ContextWindow::new(ContextConfig::default());
        let mut working = WorkingMemory::new();
        let outcome = ReactLoop::new(&llm, &exec, ReactConfig::default())
            .run(&mut window, &mut working, "Capital of France?")
            .await
            .unwrap();
        assert!(outcome.is_done());
        assert_eq!(outcome.answer, "Paris");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(window.messages().len(), 2);
        assert_eq!(llm.calls()[0].tools, vec!["echo"]);
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let llm = MockLlmClient::with_replies([
            ModelReply::ToolCalls {
                content: "need echo".into(),
                calls: vec![echo_call("c1", "first"), echo_call("c2", "second")],
            },
            ModelReply::answer("done"),
        ]);
        let exec = executor();
        let mut window = ContextWindow::new(ContextConfig::default());
        let mut working = WorkingMemory::new();
        let outcome = ReactLoop::new(&llm, &exec, ReactConfig::default())
            .run(&mut window, &mut working, "echo twice")
            .await
            .unwrap();
        assert_eq!(outcome.answer, "done");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls, 2);

        let roles: Vec<Role> = window.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
        );
        let msgs = window.messages();
        assert_eq!(msgs[1].tool_calls.len(), 2);
        assert_eq!(msgs[2].content, "first");
        assert_eq!(msgs[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(msgs[3].content, "second");

        // 第二轮推理看到了观察结果
        let second = &llm.calls()[1].messages;
        assert!(second.iter().any(|m| m.role == Role::Tool && m.content == "second"));
        assert_eq!(working.tool_names_used(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_tool_failure_is_observation() {
        let llm = MockLlmClient::with_replies([
            ModelReply::tool_call(ToolCallRequest::with_id("c1", "get_stock", serde_json::json!({}))),
            ModelReply::answer("could not look it up"),
        ]);
        let exec = executor();
        let mut window = ContextWindow::new(ContextConfig::default());
        let mut working = WorkingMemory::new();
        let outcome = ReactLoop::new(&llm, &exec, ReactConfig::default())
            .run(&mut window, &mut working, "price?")
            .await
            .unwrap();
        assert!(outcome.is_done());
        assert_eq!(window.messages()[2].content, "Error: Unknown tool: get_stock");
        assert_eq!(working.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_iterations() {
        let llm = MockLlmClient::always(ModelReply::tool_call(echo_call("loop", "again")));
        let exec = executor();
        let mut window = ContextWindow::new(ContextConfig::default());
        let mut working = WorkingMemory::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = ReactLoop::new(&llm, &exec, ReactConfig::default())
            .with_event_tx(&tx)
            .run(&mut window, &mut working, "never ends")
            .await
            .unwrap();
        assert_eq!(outcome.status, ReactStatus::Exhausted);
        assert_eq!(outcome.answer, "Error: Agent did not complete task within 10 iterations");
        assert_eq!(llm.call_count(), 10);
        assert_eq!(outcome.tool_calls, 10);

        drop(tx);
        let mut last = None;
        while let Some(ev) = rx.recv().await {
            last = Some(ev);
        }
        assert_eq!(last, Some(ReactEvent::Exhausted { iterations: 10 }));
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let llm = MockLlmClient::failing(LlmError::Auth("bad key".into()));
        let exec = executor();
        let mut window = ContextWindow::new(ContextConfig::default());
        let mut working = WorkingMemory::new();
        let err = ReactLoop::new(&llm, &exec, ReactConfig::default())
            .run(&mut window, &mut working, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Model(LlmError::Auth(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_reasoning() {
        let llm = MockLlmClient::new();
        let exec = executor();
        let mut window = ContextWindow::new(ContextConfig::default());
        let mut working = WorkingMemory::new();
        let token = CancellationToken::new();
        token.cancel();
        let err = ReactLoop::new(&llm, &exec, ReactConfig::default())
            .with_cancel_token(token)
            .run(&mut window, &mut working, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(llm.call_count(), 0);
    }
}

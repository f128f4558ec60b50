//! Headless Agent 运行时
//!
//! create_agent_components 按配置构建 LLM 客户端与带熔断 / 重试的 ToolExecutor（可多会话共享）；
//! AgentSession 在会话边界读写持久化记忆：open 载入事实与最近对话，run 跑 ReAct，save 写回。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{AgentError, CircuitBreaker, Orchestrator, RetryPolicy};
use crate::llm::{create_client, LlmClient};
use crate::memory::{
    ContextConfig, ContextWindow, JsonFileStore, MemorySnapshot, MemoryStore, WorkingMemory,
};
use crate::react::{ReactEvent, ReactLoop, ReactOutcome};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 预构建的 Agent 组件：LLM、ToolExecutor 与配置，可多会话共享
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub executor: ToolExecutor,
    pub config: AppConfig,
}

impl AgentComponents {
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.executor.breaker()
    }

    /// 共享同一熔断器的多专家编排器
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::with_specialists(
            self.llm.clone(),
            self.breaker().clone(),
            RetryPolicy::new(&self.config.retry),
            self.config.tool_timeout(),
        )
        .with_permanent_failures_trip(self.config.breaker.permanent_failures_trip)
    }

    /// [memory] data_dir 下的 JSON 文件存储
    pub fn memory_store(&self) -> Arc<dyn MemoryStore> {
        Arc::new(JsonFileStore::new(&self.config.memory.data_dir))
    }

    /// 用配置的存储与 [context] 段打开会话
    pub async fn open_session(&self, user_id: impl Into<String>) -> Result<AgentSession, AgentError> {
        AgentSession::open(self.memory_store(), user_id, self.config.context.clone()).await
    }
}

/// 用给定 LLM 与工具构建组件
pub fn build_components(cfg: AppConfig, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> AgentComponents {
    let breaker = Arc::new(CircuitBreaker::new(&cfg.breaker));
    let executor = ToolExecutor::new(
        tools,
        breaker,
        RetryPolicy::new(&cfg.retry),
        cfg.tool_timeout(),
    )
    .with_permanent_failures_trip(cfg.breaker.permanent_failures_trip);
    AgentComponents {
        llm,
        executor,
        config: cfg,
    }
}

/// 按 [llm] 段创建客户端后构建组件
pub fn create_agent_components(cfg: AppConfig, tools: ToolRegistry) -> Result<AgentComponents, AgentError> {
    let llm = create_client(&cfg.llm)?;
    Ok(build_components(cfg, llm, tools))
}

/// 单用户会话：上下文窗口 + 中期记忆 + 持久化后端
pub struct AgentSession {
    user_id: String,
    store: Arc<dyn MemoryStore>,
    window: ContextWindow,
    working: WorkingMemory,
}

impl AgentSession {
    /// 载入持久化记忆；不存在时从空记忆开始
    pub async fn open(
        store: Arc<dyn MemoryStore>,
        user_id: impl Into<String>,
        config: ContextConfig,
    ) -> Result<Self, AgentError> {
        let user_id = user_id.into();
        let snapshot = store
            .load(&user_id)
            .await
            .map_err(|e| AgentError::Persistence(format!("{e:#}")))?;
        let window = match snapshot {
            Some(snapshot) => {
                let (facts, recent) = snapshot.into_parts();
                ContextWindow::new(config).restore(facts, recent)
            }
            None => {
                tracing::info!(user_id = %user_id, "no persisted memory, starting fresh");
                ContextWindow::new(config)
            }
        };
        Ok(Self {
            user_id,
            store,
            window,
            working: WorkingMemory::new(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn window(&self) -> &ContextWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut ContextWindow {
        &mut self.window
    }

    pub fn working(&self) -> &WorkingMemory {
        &self.working
    }

    /// 显式写入长期事实
    pub fn remember(&mut self, key: impl Into<String>, value: impl Into<String>, importance: u8) {
        self.window.add_fact(key, value, importance);
    }

    /// 跑一次 ReAct 任务；中期记忆按任务重置
    pub async fn run(&mut self, components: &AgentComponents, task: &str) -> Result<ReactOutcome, AgentError> {
        self.working.clear();
        ReactLoop::new(
            components.llm.as_ref(),
            &components.executor,
            components.config.react.clone(),
        )
        .run(&mut self.window, &mut self.working, task)
        .await
    }

    /// 带事件推送与取消令牌的 run
    pub async fn run_with_events(
        &mut self,
        components: &AgentComponents,
        task: &str,
        event_tx: &mpsc::UnboundedSender<ReactEvent>,
        cancel_token: CancellationToken,
    ) -> Result<ReactOutcome, AgentError> {
        self.working.clear();
        ReactLoop::new(
            components.llm.as_ref(),
            &components.executor,
            components.config.react.clone(),
        )
        .with_event_tx(event_tx)
        .with_cancel_token(cancel_token)
        .run(&mut self.window, &mut self.working, task)
        .await
    }

    /// 写回全部事实与最近 persisted_recent 条对话
    pub async fn save(&self) -> Result<(), AgentError> {
        let recent = self
            .window
            .conversation()
            .recent(self.window.config().persisted_recent);
        let snapshot = MemorySnapshot::new(self.user_id.clone(), self.window.facts(), recent);
        self.store
            .save(&snapshot)
            .await
            .map_err(|e| AgentError::Persistence(format!("{e:#}")))
    }
}

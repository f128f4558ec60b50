//! Keel - 智能体弹性执行核心
//!
//! 模块划分：
//! - **agent**: 无头 Agent 运行时（组件构建、会话记忆载入 / 保存）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 熔断、重试、专家能力、多专家编排
//! - **llm**: 模型能力抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话、长期事实、Token 预算上下文窗口、持久化
//! - **react**: ReAct 主循环
//! - **tools**: 工具注册表与弹性执行器
//! - **workflow**: 执行计划、拓扑排序、任务分类

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod workflow;

pub use agent::{build_components, create_agent_components, AgentComponents, AgentSession};
pub use config::{load_config, AppConfig};
pub use core::{AgentError, CircuitBreaker, Orchestrator, RetryPolicy};
pub use react::{ReactLoop, ReactOutcome, ReactStatus};
pub use tools::{ToolCallOutcome, ToolExecutor, ToolRegistry};

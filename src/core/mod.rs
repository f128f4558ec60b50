//! 核心执行层：错误类型、熔断、重试、专家能力与多专家编排

pub mod circuit_breaker;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod specialist;

pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitStatus};
pub use error::AgentError;
pub use orchestrator::{synthesize, Orchestrator, OrchestratorOutcome, ALL_FAILED_MESSAGE};
pub use recovery::{RetryConfig, RetryPolicy, RetryReport};
pub use specialist::{
    classify_llm_error, format_task, register_specialists, specialist_args, SpecialistAgent,
};

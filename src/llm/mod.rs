//! LLM 层：模型能力抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use mock::{MockLlmClient, RecordedCall};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError, ModelReply};

use crate::config::LlmSection;

/// 按 [llm] 段创建客户端：provider = "openai" 走 OpenAI 兼容端点，其余回落到 Mock
pub fn create_client(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, LlmError> {
    match cfg.provider.as_str() {
        "openai" => {
            let client = OpenAiClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                cfg.api_key.as_deref(),
                Duration::from_secs(cfg.request_timeout_secs),
            )?;
            tracing::info!(model = %cfg.model, "using OpenAI-compatible LLM backend");
            Ok(Arc::new(client))
        }
        other => {
            if other != "mock" {
                tracing::warn!(provider = %other, "unknown LLM provider, falling back to mock");
            }
            Ok(Arc::new(MockLlmClient::new()))
        }
    }
}

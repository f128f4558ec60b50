//! 记忆层：短期（对话）、中期（工作状态）、长期（事实）、Token 预算窗口与持久化

pub mod conversation;
pub mod long_term;
pub mod persistence;
pub mod token_budget;
pub mod window;
pub mod working;

pub use conversation::{ConversationMemory, Message, Role};
pub use long_term::{FactStore, MemoryFact};
pub use persistence::{InMemoryStore, JsonFileStore, MemorySnapshot, MemoryStore};
pub use token_budget::{count_messages_tokens, TokenCounter, TokenEstimator};
pub use window::{omission_notice, ContextConfig, ContextWindow};
pub use working::WorkingMemory;

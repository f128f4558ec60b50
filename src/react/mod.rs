//! 认知层：ReAct 主循环与过程事件

pub mod events;
pub mod loop_;

pub use events::ReactEvent;
pub use loop_::{exhausted_message, ReactConfig, ReactLoop, ReactOutcome, ReactStatus, DEFAULT_SYSTEM_PROMPT};

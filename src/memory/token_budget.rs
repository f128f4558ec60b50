//! Token 计数
//!
//! 上下文窗口按 token 而非字符计量。TokenCounter 是可插拔能力：默认用启发式估算器，
//! 需要精确计数时可接入真实分词器；闭包 `Fn(&str) -> usize` 也可直接作为计数器使用。

use crate::memory::Message;

/// 单条消息在 role、格式标记上的固定开销（token）
pub const DEFAULT_PER_ENTRY_OVERHEAD: usize = 4;

/// 文本 -> token 数
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count_tokens(&self, text: &str) -> usize {
        self(text)
    }
}

/// Token 估算器（简单的字符计数近似）
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：英文约 4 字符/token，中文约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars.div_ceil(4) + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

impl TokenCounter for TokenEstimator {
    fn count_tokens(&self, text: &str) -> usize {
        Self::estimate(text)
    }
}

/// 单条消息的 token 数（含固定开销）
pub fn count_message_tokens(counter: &dyn TokenCounter, message: &Message, overhead: usize) -> usize {
    counter.count_tokens(&message.accounted_text()) + overhead
}

/// 消息序列的 token 总数
pub fn count_messages_tokens(counter: &dyn TokenCounter, messages: &[Message], overhead: usize) -> usize {
    messages
        .iter()
        .map(|m| count_message_tokens(counter, m, overhead))
        .sum()
}

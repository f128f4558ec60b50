//! 上下文窗口：Token 预算内的对话视图
//!
//! 持有对话日志与长期事实；render 产出交给模型的消息序列，保证总 token（含每条固定开销）
//! 不超过 `max_context_tokens - response_reserve`。
//!
//! 渲染策略：
//! 1. 始终包含 system 条目（提示词 + 可选的事实摘要）
//! 2. 从最新消息向前累加，遇到第一条放不下的即停止，消息从不截断
//! 3. 有消息被省略时，在 system 之后插入一条省略提示
//!
//! 渲染不修改对话日志。

use std::sync::Arc;

use serde::Deserialize;

use crate::memory::token_budget::{count_message_tokens, DEFAULT_PER_ENTRY_OVERHEAD};
use crate::memory::{ConversationMemory, FactStore, Message, TokenCounter, TokenEstimator};

/// [context] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_context_tokens: usize,
    /// 为模型回复预留的 token
    pub response_reserve: usize,
    pub per_entry_overhead: usize,
    /// 事实摘要最多条数
    pub max_facts: usize,
    /// 持久化时保留的最近消息条数
    pub persisted_recent: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 4000,
            response_reserve: 500,
            per_entry_overhead: DEFAULT_PER_ENTRY_OVERHEAD,
            max_facts: 10,
            persisted_recent: 20,
        }
    }
}

/// 省略提示文本
pub fn omission_notice(omitted: usize) -> String {
    format!("[Earlier conversation history of {omitted} messages omitted to fit context window]")
}

/// 上下文窗口（单会话独占，无需同步）
#[derive(Clone)]
pub struct ContextWindow {
    conversation: ConversationMemory,
    facts: FactStore,
    counter: Arc<dyn TokenCounter>,
    config: ContextConfig,
}

impl ContextWindow {
    pub fn new(config: ContextConfig) -> Self {
        Self::with_counter(config, Arc::new(TokenEstimator))
    }

    pub fn with_counter(config: ContextConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            conversation: ConversationMemory::new(),
            facts: FactStore::new(),
            counter,
            config,
        }
    }

    /// 从持久化记忆恢复（会话开始时）
    pub fn restore(mut self, facts: FactStore, recent: Vec<Message>) -> Self {
        self.facts = facts;
        self.conversation = ConversationMemory::from_messages(recent);
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// 可用预算：max_context_tokens - response_reserve
    pub fn budget(&self) -> usize {
        self.config
            .max_context_tokens
            .saturating_sub(self.config.response_reserve)
    }

    pub fn push(&mut self, msg: Message) {
        self.conversation.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn conversation(&self) -> &ConversationMemory {
        &self.conversation
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn add_fact(&mut self, key: impl Into<String>, value: impl Into<String>, importance: u8) {
        self.facts.add(key, value, importance);
    }

    pub fn get_fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key)
    }

    pub fn remove_fact(&mut self, key: &str) -> bool {
        self.facts.remove(key).is_some()
    }

    /// 清空对话，长期事实保留
    pub fn clear_conversation(&mut self) {
        self.conversation.clear();
    }

    fn cost(&self, msg: &Message) -> usize {
        count_message_tokens(self.counter.as_ref(), msg, self.config.per_entry_overhead)
    }

    /// 已渲染序列的 token 总数（与 render 使用同一口径）
    pub fn count_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.cost(m)).sum()
    }

    /// 产出预算内的消息序列：system、省略提示（如有）、按原顺序的最近消息
    pub fn render(&self, system_prompt: &str, include_facts: bool) -> Vec<Message> {
        let budget = self.budget();

        let mut system_content = system_prompt.to_string();
        if include_facts {
            let digest = self.facts.digest(self.config.max_facts);
            if !digest.is_empty() {
                system_content.push_str("\n\n");
                system_content.push_str(&digest);
            }
        }
        let system = Message::system(system_content);
        let system_cost = self.cost(&system);

        let history = self.conversation.messages();
        let costs: Vec<usize> = history.iter().map(|m| self.cost(m)).collect();
        let history_cost: usize = costs.iter().sum();

        let mut rendered = Vec::with_capacity(history.len() + 2);
        rendered.push(system);

        if system_cost + history_cost <= budget {
            rendered.extend(history.iter().cloned());
            return rendered;
        }

        if system_cost > budget {
            tracing::warn!(
                system_tokens = system_cost,
                budget,
                "system entry alone exceeds context budget"
            );
        }

        // 至少省略一条，需为省略提示留出空间
        let total = history.len();
        let mut used = system_cost;
        let mut included = 0usize;
        for cost in costs.iter().rev() {
            let omitted_after = total - included - 1;
            let notice_cost = self.cost(&Message::system(omission_notice(omitted_after)));
            if used + cost + notice_cost > budget {
                break;
            }
            used += cost;
            included += 1;
        }

        let omitted = total - included;
        tracing::debug!(omitted, included, budget, "context window trimmed");
        rendered.push(Message::system(omission_notice(omitted)));
        rendered.extend(history[omitted..].iter().cloned());
        rendered
    }
}

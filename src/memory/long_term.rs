//! 长期记忆：跨会话保存的事实（key 唯一，后写覆盖）
//!
//! 事实只通过显式 add / remove 修改；渲染时按重要度降序取前 N 条拼成摘要注入 system 消息。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 重要度取值范围
pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 10;

/// 单条长期事实
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFact {
    pub key: String,
    pub value: String,
    pub importance: u8,
    pub updated_at: DateTime<Utc>,
}

/// 事实存储：BTreeMap 保证遍历顺序稳定（同重要度按 key 升序）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FactStore {
    facts: BTreeMap<String, MemoryFact>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_facts(facts: impl IntoIterator<Item = MemoryFact>) -> Self {
        let mut store = Self::new();
        for fact in facts {
            store.insert(fact);
        }
        store
    }

    /// 新增或覆盖；importance 夹到 1..=10
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>, importance: u8) {
        let key = key.into();
        let clamped = importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE);
        if clamped != importance {
            tracing::warn!(key = %key, importance, "fact importance out of range, clamped to {}", clamped);
        }
        self.facts.insert(
            key.clone(),
            MemoryFact {
                key,
                value: value.into(),
                importance: clamped,
                updated_at: Utc::now(),
            },
        );
    }

    fn insert(&mut self, mut fact: MemoryFact) {
        fact.importance = fact.importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE);
        self.facts.insert(fact.key.clone(), fact);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(|f| f.value.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<MemoryFact> {
        self.facts.remove(key)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryFact> {
        self.facts.values()
    }

    /// 按重要度降序的前 limit 条（稳定排序，同分保持 key 顺序）
    pub fn top(&self, limit: usize) -> Vec<&MemoryFact> {
        let mut sorted: Vec<&MemoryFact> = self.facts.values().collect();
        sorted.sort_by(|a, b| b.importance.cmp(&a.importance));
        sorted.truncate(limit);
        sorted
    }

    /// 事实摘要：`- key: value` 每行一条；无事实时为空串
    pub fn digest(&self, limit: usize) -> String {
        let top = self.top(limit);
        if top.is_empty() {
            return String::new();
        }
        let mut text = String::from("Important context from previous conversations:\n");
        for fact in top {
            text.push_str(&format!("- {}: {}\n", fact.key, fact.value));
        }
        text
    }
}

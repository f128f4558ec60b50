//! 中期记忆：当前任务目标、已尝试方案、失败原因，以及临时键值状态
//!
//! 只在单次会话内有效，不持久化。

use std::collections::HashMap;

use serde_json::Value;

#[derive(Clone, Debug, Default)]
pub struct WorkingMemory {
    pub goal: Option<String>,
    pub attempts: Vec<String>,
    pub failures: Vec<String>,
    state: HashMap<String, Value>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_goal(&mut self, goal: impl Into<String>) {
        self.goal = Some(goal.into());
    }

    pub fn add_attempt(&mut self, attempt: impl Into<String>) {
        self.attempts.push(attempt.into());
    }

    pub fn add_failure(&mut self, failure: impl Into<String>) {
        self.failures.push(failure.into());
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn clear(&mut self) {
        self.goal = None;
        self.attempts.clear();
        self.failures.clear();
        self.state.clear();
    }

    /// 从 attempts（格式 "tool -> observation"）中提取用过的工具名，保持首次出现顺序
    pub fn tool_names_used(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for attempt in &self.attempts {
            if let Some(name) = attempt.split(" -> ").next().map(|s| s.trim().to_string()) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

//! 执行计划类型定义
//!
//! ExecutionStep 描述一个专家调用及其依赖；ExecutionPlan 只能通过校验 + 拓扑排序构造，构造后不可变。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::graph::topological_order;

/// 专家 / 能力标识
pub type AgentId = String;

/// 专家类别（固定顺序：research -> analysis -> writing）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCategory {
    Research,
    Analysis,
    Writing,
}

impl AgentCategory {
    pub const ALL: [AgentCategory; 3] = [
        AgentCategory::Research,
        AgentCategory::Analysis,
        AgentCategory::Writing,
    ];

    /// 注册到执行器时使用的能力名
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCategory::Research => "research",
            AgentCategory::Analysis => "analysis",
            AgentCategory::Writing => "writing",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == id)
    }

    /// 该类别步骤的任务描述
    pub fn step_task(&self, task: &str) -> String {
        match self {
            AgentCategory::Research => format!("Research the following: {task}"),
            AgentCategory::Analysis => format!("Analyze the following: {task}"),
            AgentCategory::Writing => format!("Write a clear explanation of: {task}"),
        }
    }
}

/// 计划中的一步
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub agent: AgentId,
    pub task: String,
    #[serde(default)]
    pub depends_on: BTreeSet<AgentId>,
}

impl ExecutionStep {
    pub fn new(agent: impl Into<AgentId>, task: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            task: task.into(),
            depends_on: BTreeSet::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AgentId>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }
}

/// 拓扑有序的执行计划：每步的依赖都出现在更早的位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    steps: Vec<ExecutionStep>,
}

impl ExecutionPlan {
    /// 校验并按依赖排序（无依赖约束的步骤保持输入顺序）
    pub fn new(steps: Vec<ExecutionStep>) -> Result<Self, WorkflowError> {
        let order = topological_order(&steps)?;
        let mut slots: Vec<Option<ExecutionStep>> = steps.into_iter().map(Some).collect();
        let steps = order
            .into_iter()
            .filter_map(|i| slots.get_mut(i).and_then(Option::take))
            .collect();
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn agents(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.agent.as_str()).collect()
    }
}

/// 单步执行结果；失败时 payload 为空，error 为渲染后的失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentResult {
    pub agent: AgentId,
    pub success: bool,
    pub payload: String,
    pub error: Option<String>,
}

impl AgentResult {
    pub fn ok(agent: impl Into<AgentId>, payload: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            success: true,
            payload: payload.into(),
            error: None,
        }
    }

    pub fn failed(agent: impl Into<AgentId>, error: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            success: false,
            payload: String::new(),
            error: Some(error.into()),
        }
    }
}

/// 计划错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Execution plan is empty")]
    EmptyPlan,
    #[error("Duplicate step: {0}")]
    DuplicateStep(AgentId),
    #[error("Step {0} depends on itself")]
    SelfDependency(AgentId),
    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: AgentId, dependency: AgentId },
    #[error("Cyclic dependency among steps: {}", .0.join(", "))]
    CyclicDependency(Vec<AgentId>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_reorders_by_dependency() {
        let plan = ExecutionPlan::new(vec![
            ExecutionStep::new("writing", "w").depends_on(["analysis"]),
            ExecutionStep::new("research", "r"),
            ExecutionStep::new("analysis", "a").depends_on(["research"]),
        ])
        .unwrap();
        assert_eq!(plan.agents(), vec!["research", "analysis", "writing"]);
    }

    #[test]
    fn test_category_roundtrip() {
        for c in AgentCategory::ALL {
            assert_eq!(AgentCategory::from_id(c.as_str()), Some(c));
        }
        assert_eq!(
            AgentCategory::Writing.step_task("AI agents"),
            "Write a clear explanation of: AI agents"
        );
    }
}

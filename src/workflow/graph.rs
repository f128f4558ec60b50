//! 执行计划依赖图
//!
//! 使用邻接表和入度表实现 DAG 拓扑排序（Kahn）；就绪节点按输入下标取最小者，结果稳定。

use std::collections::{BTreeSet, HashMap};

use crate::workflow::types::{ExecutionStep, WorkflowError};

/// 计划依赖图（节点为步骤在输入中的下标）
pub struct PlanGraph {
    /// 邻接表：步骤 -> 依赖它的步骤
    pub adjacency: Vec<Vec<usize>>,
    /// 入度表：步骤 -> 依赖数
    pub in_degree: Vec<usize>,
}

impl PlanGraph {
    /// 创建依赖图；校验重复步骤、自依赖与未知依赖
    pub fn new(steps: &[ExecutionStep]) -> Result<Self, WorkflowError> {
        if steps.is_empty() {
            return Err(WorkflowError::EmptyPlan);
        }

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.agent.as_str(), i).is_some() {
                return Err(WorkflowError::DuplicateStep(step.agent.clone()));
            }
        }

        let mut adjacency = vec![Vec::new(); steps.len()];
        let mut in_degree = vec![0usize; steps.len()];
        for (i, step) in steps.iter().enumerate() {
            for dep in &step.depends_on {
                if dep == &step.agent {
                    return Err(WorkflowError::SelfDependency(step.agent.clone()));
                }
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(WorkflowError::UnknownDependency {
                        step: step.agent.clone(),
                        dependency: dep.clone(),
                    });
                };
                adjacency[d].push(i);
                in_degree[i] += 1;
            }
        }

        Ok(Self {
            adjacency,
            in_degree,
        })
    }

    /// 拓扑序；存在环时返回环上（未能排序）的步骤
    pub fn order(mut self, steps: &[ExecutionStep]) -> Result<Vec<usize>, WorkflowError> {
        let mut ready: BTreeSet<usize> = self
            .in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(steps.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &dependent in &self.adjacency[i] {
                self.in_degree[dependent] -= 1;
                if self.in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < steps.len() {
            let stuck = self
                .in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| steps[i].agent.clone())
                .collect();
            return Err(WorkflowError::CyclicDependency(stuck));
        }
        Ok(order)
    }
}

/// 校验并返回拓扑序（输入下标）
pub fn topological_order(steps: &[ExecutionStep]) -> Result<Vec<usize>, WorkflowError> {
    PlanGraph::new(steps)?.order(steps)
}

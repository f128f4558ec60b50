//! 多专家编排：规划 -> 执行 -> 汇总
//!
//! 规划：分类器给出命中的类别，按 research -> analysis -> writing 生成步骤，每步依赖所有更早命中的类别；
//! 都未命中时退化为对原始任务的单个 writing 步骤。
//! 执行：按计划顺序逐步经 ToolExecutor 调用对应专家，上下文只取成功完成的依赖步骤输出；单步失败不影响后续步骤。
//! 汇总：writing 成功则直接作为最终答案；否则按 research、analysis 顺序拼接成功的段落；全部失败返回固定提示。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::core::specialist::{register_specialists, specialist_args};
use crate::core::{AgentError, CircuitBreaker, RetryPolicy};
use crate::llm::LlmClient;
use crate::tools::{ToolCallOutcome, ToolCallRequest, ToolExecutor, ToolRegistry};
use crate::workflow::{
    AgentCategory, AgentResult, ExecutionPlan, ExecutionStep, KeywordClassifier, TaskClassifier,
    WorkflowError,
};

pub const ALL_FAILED_MESSAGE: &str = "Error: All agents failed to produce results.";

/// 一次编排的完整记录
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorOutcome {
    pub plan: ExecutionPlan,
    pub results: Vec<AgentResult>,
    pub answer: String,
}

pub struct Orchestrator {
    executor: ToolExecutor,
    classifier: Box<dyn TaskClassifier>,
}

impl Orchestrator {
    /// executor 的注册表中需包含计划会用到的专家
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            executor,
            classifier: Box::new(KeywordClassifier::new()),
        }
    }

    /// 用三个默认专家构建
    pub fn with_specialists(
        llm: Arc<dyn LlmClient>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        let mut registry = ToolRegistry::new();
        register_specialists(&mut registry, llm);
        Self::new(ToolExecutor::new(registry, breaker, retry, timeout))
    }

    /// 专家的永久 / 未分类失败是否计入熔断
    pub fn with_permanent_failures_trip(mut self, trip: bool) -> Self {
        self.executor = self.executor.with_permanent_failures_trip(trip);
        self
    }

    pub fn with_classifier(mut self, classifier: impl TaskClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    /// 生成执行计划
    pub fn plan(&self, task: &str) -> Result<ExecutionPlan, WorkflowError> {
        let categories = self.classifier.classify(task);
        let mut steps = Vec::with_capacity(categories.len().max(1));
        let mut earlier: Vec<&'static str> = Vec::new();
        for category in AgentCategory::ALL {
            if !categories.contains(&category) {
                continue;
            }
            steps.push(
                ExecutionStep::new(category.as_str(), category.step_task(task))
                    .depends_on(earlier.iter().copied()),
            );
            earlier.push(category.as_str());
        }
        if steps.is_empty() {
            steps.push(ExecutionStep::new(AgentCategory::Writing.as_str(), task));
        }
        let plan = ExecutionPlan::new(steps)?;
        tracing::info!(steps = ?plan.agents(), "execution plan created");
        Ok(plan)
    }

    /// 按计划顺序执行，每步产出一个 AgentResult
    pub async fn execute(&self, plan: &ExecutionPlan) -> Vec<AgentResult> {
        let mut results: Vec<AgentResult> = Vec::with_capacity(plan.len());
        for step in plan.steps() {
            // 失败的依赖静默略过
            let context: Vec<(String, String)> = results
                .iter()
                .filter(|r| r.success && step.depends_on.contains(&r.agent))
                .map(|r| (r.agent.clone(), r.payload.clone()))
                .collect();

            tracing::info!(agent = %step.agent, context = context.len(), "running specialist");
            let request = ToolCallRequest::new(step.agent.clone(), specialist_args(&step.task, &context));
            let result = match self.executor.invoke(&request).await {
                ToolCallOutcome::Success { payload } => AgentResult::ok(step.agent.clone(), payload),
                failure => {
                    tracing::warn!(agent = %step.agent, outcome = failure.label(), "specialist failed");
                    AgentResult::failed(step.agent.clone(), failure.render())
                }
            };
            results.push(result);
        }
        results
    }

    /// 规划、执行并汇总
    pub async fn run(&self, task: &str) -> Result<OrchestratorOutcome, AgentError> {
        let plan = self.plan(task)?;
        let results = self.execute(&plan).await;
        let answer = synthesize(&results);
        Ok(OrchestratorOutcome {
            plan,
            results,
            answer,
        })
    }
}

/// 汇总各步结果
pub fn synthesize(results: &[AgentResult]) -> String {
    let succeeded = |id: &str| {
        results
            .iter()
            .find(|r| r.success && r.agent == id)
            .map(|r| r.payload.as_str())
    };

    if let Some(writing) = succeeded(AgentCategory::Writing.as_str()) {
        return writing.to_string();
    }

    let mut sections = Vec::new();
    if let Some(research) = succeeded(AgentCategory::Research.as_str()) {
        sections.push(format!("## Research Findings\n\n{research}"));
    }
    if let Some(analysis) = succeeded(AgentCategory::Analysis.as_str()) {
        sections.push(format!("## Analysis\n\n{analysis}"));
    }
    // 非内置类别的专家按计划顺序附在后面
    for r in results
        .iter()
        .filter(|r| r.success && AgentCategory::from_id(&r.agent).is_none())
    {
        sections.push(format!("## {}\n\n{}", r.agent, r.payload));
    }

    if sections.is_empty() {
        return ALL_FAILED_MESSAGE.to_string();
    }
    sections.join("\n\n")
}

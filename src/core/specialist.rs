//! 专家能力：研究 / 分析 / 写作
//!
//! 每个专家是一个以模型为后端的 Tool，注册进 ToolRegistry 后和普通工具一样经 ToolExecutor 调用，
//! 因此共享熔断与重试。参数：`task`（必需）与 `context`（先前专家的输出，`[{agent, output}]`，保持顺序）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::{ParameterSpec, Tool, ToolError, ToolRegistry};
use crate::workflow::AgentCategory;

const RESEARCH_PROMPT: &str = "You are a research specialist agent.

Your job: Gather relevant information and facts about a topic.

Output format:
- Key facts (bulleted list)
- Relevant data points
- Important context

Be thorough but concise. Focus on facts, not opinions.";

const ANALYSIS_PROMPT: &str = "You are an analysis specialist agent.

Your job: Process information and extract insights.

Output format:
- Key patterns identified
- Important insights
- Recommendations based on data

Be analytical and data-driven. Support conclusions with evidence.";

const WRITING_PROMPT: &str = "You are a writing specialist agent.

Your job: Create clear, engaging content.

Output format:
- Well-structured prose
- Clear explanations
- Appropriate tone for audience

Be clear and concise. Avoid jargon unless necessary.";

pub fn default_prompt(category: AgentCategory) -> &'static str {
    match category {
        AgentCategory::Research => RESEARCH_PROMPT,
        AgentCategory::Analysis => ANALYSIS_PROMPT,
        AgentCategory::Writing => WRITING_PROMPT,
    }
}

/// 模型错误分类：超时 / 限流 / 5xx / 网络可重试，鉴权 / 非法请求为永久，其余未分类
pub fn classify_llm_error(e: LlmError) -> ToolError {
    match e {
        LlmError::RateLimited { retry_after_ms } => ToolError::RateLimited {
            message: e.to_string(),
            retry_after: Duration::from_millis(retry_after_ms),
        },
        LlmError::Timeout
        | LlmError::Server { .. }
        | LlmError::Network(_) => ToolError::Retryable(e.to_string()),
        LlmError::Auth(_) | LlmError::InvalidRequest(_) => ToolError::Permanent(e.to_string()),
        LlmError::Parse(_) => ToolError::Unclassified(e.to_string()),
    }
}

/// 把任务与上下文编成专家的调用参数
pub fn specialist_args(task: &str, context: &[(String, String)]) -> Value {
    let context: Vec<Value> = context
        .iter()
        .map(|(agent, output)| serde_json::json!({ "agent": agent, "output": output }))
        .collect();
    serde_json::json!({ "task": task, "context": context })
}

/// 任务文本后附先前专家的输出；无上下文时原样返回
pub fn format_task(task: &str, context: &[(String, String)]) -> String {
    if context.is_empty() {
        return task.to_string();
    }
    let mut text = format!("{task}\n\nContext from previous agents:\n");
    for (agent, output) in context {
        text.push_str(&format!("\n{agent}:\n{output}\n"));
    }
    text
}

fn parse_context(args: &Value) -> Result<Vec<(String, String)>, ToolError> {
    let Some(items) = args.get("context") else {
        return Ok(Vec::new());
    };
    let items = match items {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(ToolError::Permanent("context must be an array".to_string())),
    };
    items
        .iter()
        .map(|item| {
            let agent = item.get("agent").and_then(Value::as_str);
            let output = item.get("output").and_then(Value::as_str);
            match (agent, output) {
                (Some(a), Some(o)) => Ok((a.to_string(), o.to_string())),
                _ => Err(ToolError::Permanent(
                    "context entries need string fields agent and output".to_string(),
                )),
            }
        })
        .collect()
}

/// 以模型为后端的专家
pub struct SpecialistAgent {
    category: AgentCategory,
    system_prompt: String,
    llm: Arc<dyn LlmClient>,
}

impl SpecialistAgent {
    pub fn new(category: AgentCategory, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            category,
            system_prompt: default_prompt(category).to_string(),
            llm,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn category(&self) -> AgentCategory {
        self.category
    }
}

#[async_trait]
impl Tool for SpecialistAgent {
    fn name(&self) -> &str {
        self.category.as_str()
    }

    fn description(&self) -> &str {
        match self.category {
            AgentCategory::Research => "Gathers information and facts",
            AgentCategory::Analysis => "Processes data and extracts insights",
            AgentCategory::Writing => "Creates polished content",
        }
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("task", "string", "What to do"),
            ParameterSpec::optional("context", "array", "Outputs of previous agents"),
        ]
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let task = args
            .get("task")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Permanent("missing required argument: task".to_string()))?;
        let context = parse_context(&args)?;

        let messages = [
            Message::system(self.system_prompt.clone()),
            Message::user(format_task(task, &context)),
        ];
        self.llm.complete(&messages).await.map_err(classify_llm_error)
    }
}

/// 把三个默认专家注册进 registry
pub fn register_specialists(registry: &mut ToolRegistry, llm: Arc<dyn LlmClient>) {
    for category in AgentCategory::ALL {
        registry.register(SpecialistAgent::new(category, llm.clone()));
    }
}

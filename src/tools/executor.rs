//! 工具执行器（弹性调用边界）
//!
//! 对每个 ToolCallRequest：
//! 1. 未注册 → PermanentFailure（不触碰熔断器）
//! 2. 熔断打开 → PermanentFailure，不调用、不记失败
//! 3. 在 RetryPolicy 下调用，每次尝试有独立超时；每次尝试前重新检查熔断
//! 4. 成功 record_success；可重试失败 record_failure 后退避重试；永久 / 未分类失败立即返回
//!
//! 每次调用输出一行结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::time::{timeout, Instant};

use crate::core::{CircuitBreaker, RetryPolicy};
use crate::tools::{ToolCallOutcome, ToolCallRequest, ToolError, ToolRegistry, ToolSchema};

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// 单次尝试超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 工具执行器：熔断 + 重试 + 超时，为每个请求产出恰好一个 ToolCallOutcome
pub struct ToolExecutor {
    registry: ToolRegistry,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    timeout: Duration,
    permanent_failures_trip: bool,
}

impl ToolExecutor {
    pub fn new(
        registry: ToolRegistry,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            breaker,
            retry,
            timeout,
            permanent_failures_trip: true,
        }
    }

    /// 永久 / 未分类失败是否计入熔断（默认计入）
    pub fn with_permanent_failures_trip(mut self, trip: bool) -> Self {
        self.permanent_failures_trip = trip;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 按名称与 JSON 参数调用
    pub async fn execute(&self, name: &str, args: Value) -> ToolCallOutcome {
        self.invoke(&ToolCallRequest::new(name, args)).await
    }

    pub async fn invoke(&self, request: &ToolCallRequest) -> ToolCallOutcome {
        let start = Instant::now();
        let name = request.name.as_str();

        let Some(tool) = self.registry.get(name) else {
            let outcome = ToolCallOutcome::from(Err(ToolError::UnknownTool(name.to_string())));
            self.audit(request, &outcome, 0, start);
            return outcome;
        };

        if self.breaker.is_open(name) {
            tracing::warn!(tool = %name, "circuit open, fast-failing tool call");
            let outcome = ToolCallOutcome::from(Err(ToolError::CircuitOpen(name.to_string())));
            self.audit(request, &outcome, 0, start);
            return outcome;
        }

        // 调用方中途丢弃本 future 时归还 HALF_OPEN 探测名额
        let mut slot = HalfOpenSlotGuard {
            breaker: &self.breaker,
            name,
            armed: true,
        };
        let mut executed = 0u32;
        let report = self
            .retry
            .retry(name, |attempt| {
                let tool = tool.clone();
                let args = request.arguments_value();
                // 首次尝试已在上面检查过熔断（HALF_OPEN 时会占用探测名额，不能重复检查）
                let blocked = attempt > 1 && self.breaker.is_open(name);
                if !blocked {
                    executed += 1;
                }
                async move {
                    if blocked {
                        tracing::warn!(tool = %name, attempt, "circuit opened during retries");
                        return Err(ToolError::CircuitOpen(name.to_string()));
                    }
                    let result = match timeout(self.timeout, tool.execute(args)).await {
                        Ok(result) => result,
                        Err(_) => Err(ToolError::Timeout(name.to_string())),
                    };
                    self.record(name, &result);
                    result
                }
            })
            .await;
        slot.armed = false;

        let outcome = ToolCallOutcome::from(report.result);
        self.audit(request, &outcome, executed, start);
        outcome
    }

    fn record(&self, name: &str, result: &Result<String, ToolError>) {
        match result {
            Ok(_) => self.breaker.record_success(name),
            Err(e) if e.is_retryable() || self.permanent_failures_trip => {
                self.breaker.record_failure(name)
            }
            Err(_) => self.breaker.release_probe(name),
        }
    }

    fn audit(&self, request: &ToolCallRequest, outcome: &ToolCallOutcome, attempts: u32, start: Instant) {
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.name,
            "call_id": request.id,
            "outcome": outcome.label(),
            "attempts": attempts,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&request.arguments_value()),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
    }
}

struct HalfOpenSlotGuard<'a> {
    breaker: &'a CircuitBreaker,
    name: &'a str,
    armed: bool,
}

impl Drop for HalfOpenSlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(tool = %self.name, "tool call dropped before completion");
            self.breaker.release_probe(self.name);
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::core::{CircuitStatus, RetryConfig};
    use crate::tools::{EchoTool, Tool};

    /// 前 fail_times 次返回 error，之后成功
    struct ScriptedTool {
        name: &'static str,
        calls: Arc<AtomicU32>,
        fail_times: u32,
        error: ToolError,
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "scripted"
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_times {
                Err(self.error.clone())
            } else {
                Ok(format!("ok after {n}"))
            }
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "never finishes in time"
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".into())
        }
    }

    fn scripted(name: &'static str, fail_times: u32, error: ToolError) -> (ScriptedTool, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            ScriptedTool {
                name,
                calls: calls.clone(),
                fail_times,
                error,
            },
            calls,
        )
    }

    fn executor(tools: Vec<Arc<dyn Tool>>, threshold: u32) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        for t in tools {
            registry.register_arc(t);
        }
        let retry = RetryPolicy::new(&RetryConfig {
            jitter_ms: 0,
            ..RetryConfig::default()
        });
        ToolExecutor::new(
            registry,
            Arc::new(CircuitBreaker::with_timeout(threshold, Duration::from_secs(60))),
            retry,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_success() {
        let exec = executor(vec![], 5);
        let out = exec.execute("echo", serde_json::json!({"text": "hello"})).await;
        assert_eq!(out, ToolCallOutcome::Success { payload: "hello".into() });
        assert_eq!(exec.breaker().status("echo"), CircuitStatus::Closed);
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_touch_breaker() {
        let exec = executor(vec![], 5);
        let out = exec.execute("nope", Value::Null).await;
        assert_eq!(out.render(), "Error: Unknown tool: nope");
        assert_eq!(exec.breaker().failure_count("nope"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_attempted_three_times() {
        let (tool, calls) = scripted("flaky", u32::MAX, ToolError::Retryable("503".into()));
        let exec = executor(vec![Arc::new(tool)], 10);
        let out = exec.execute("flaky", Value::Null).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(out, ToolCallOutcome::RetryableFailure { message: "503".into() });
        assert_eq!(exec.breaker().failure_count("flaky"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success_resets_breaker() {
        let (tool, calls) = scripted("flaky", 1, ToolError::Retryable("rate limited".into()));
        let exec = executor(vec![Arc::new(tool)], 10);
        let out = exec.execute("flaky", Value::Null).await;
        assert!(out.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(exec.breaker().failure_count("flaky"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_attempted_once_and_counts() {
        let (tool, calls) = scripted("strict", u32::MAX, ToolError::Permanent("invalid city".into()));
        let exec = executor(vec![Arc::new(tool)], 10);
        let out = exec.execute("strict", Value::Null).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.render(), "Error: invalid city");
        assert_eq!(exec.breaker().failure_count("strict"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failures_can_be_excluded_from_breaker() {
        let (tool, _) = scripted("strict", u32::MAX, ToolError::Unclassified("boom".into()));
        let exec = executor(vec![Arc::new(tool)], 10).with_permanent_failures_trip(false);
        let out = exec.execute("strict", Value::Null).await;
        assert_eq!(out.render(), "Error: Unexpected error: boom");
        assert_eq!(exec.breaker().failure_count("strict"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opening_mid_retry_stops_attempts() {
        let (tool, calls) = scripted("db", u32::MAX, ToolError::Retryable("connection reset".into()));
        let exec = executor(vec![Arc::new(tool)], 2);
        let out = exec.execute("db", Value::Null).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match out {
            ToolCallOutcome::PermanentFailure { message } => assert!(message.contains("unavailable")),
            other => panic!("expected PermanentFailure, got {other:?}"),
        }

        // 打开后快速失败，不调用工具
        let out = exec.execute("db", Value::Null).await;
        assert!(!out.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(exec.breaker().failure_count("db"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let (tool, calls) = scripted("db", 2, ToolError::Retryable("connection reset".into()));
        let exec = executor(vec![Arc::new(tool)], 2);
        let _ = exec.execute("db", Value::Null).await;
        assert_eq!(exec.breaker().status("db"), CircuitStatus::Open);

        tokio::time::advance(Duration::from_secs(60)).await;
        let out = exec.execute("db", Value::Null).await;
        assert!(out.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(exec.breaker().status("db"), CircuitStatus::Closed);
    }

    /// 第一次失败，之后一直挂起
    struct HangAfterFailureTool {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for HangAfterFailureTool {
        fn name(&self) -> &str {
            "hang"
        }

        fn description(&self) -> &str {
            "fails once then hangs"
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ToolError::Permanent("down".into()));
            }
            std::future::pending::<()>().await;
            Ok("never".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_frees_half_open_slot() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(HangAfterFailureTool { calls: calls.clone() });
        let exec = ToolExecutor::new(
            registry,
            Arc::new(CircuitBreaker::with_timeout(1, Duration::from_secs(10))),
            RetryPolicy::no_retry(),
            Duration::from_secs(3600),
        );

        let _ = exec.execute("hang", Value::Null).await;
        assert_eq!(exec.breaker().status("hang"), CircuitStatus::Open);

        tokio::time::advance(Duration::from_secs(10)).await;
        let dropped = tokio::time::timeout(Duration::from_secs(1), exec.execute("hang", Value::Null)).await;
        assert!(dropped.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // 名额已归还：下一次检查再放行一次探测
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!exec.breaker().is_open("hang"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retryable() {
        let exec = executor(vec![Arc::new(SlowTool)], 10);
        let out = exec.execute("slow", Value::Null).await;
        assert_eq!(
            out,
            ToolCallOutcome::RetryableFailure {
                message: "Tool timeout: slow".into()
            }
        );
        assert_eq!(exec.breaker().failure_count("slow"), 3);
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = serde_json::json!({ "text": "é".repeat(500) });
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}

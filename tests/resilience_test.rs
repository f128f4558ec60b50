//! 弹性调用边界集成测试：熔断 + 重试 + 共享熔断器

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use keel::core::{CircuitBreaker, CircuitStatus, RetryConfig, RetryPolicy};
use keel::tools::{Tool, ToolCallOutcome, ToolError, ToolExecutor, ToolRegistry};

/// 模拟天气服务：前 outage 次调用返回 503
struct WeatherTool {
    calls: Arc<AtomicU32>,
    outage: u32,
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city"
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.outage {
            return Err(ToolError::Retryable("weather service returned 503".into()));
        }
        match args.get("city").and_then(Value::as_str) {
            Some("Seattle") => Ok("Seattle: 62F, rainy".into()),
            Some(city) => Err(ToolError::Permanent(format!("unknown city: {city}"))),
            None => Err(ToolError::Permanent("missing city".into())),
        }
    }
}

fn executor(outage: u32, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> (ToolExecutor, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(WeatherTool {
        calls: calls.clone(),
        outage,
    });
    (
        ToolExecutor::new(registry, breaker, retry, Duration::from_secs(5)),
        calls,
    )
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy::new(&RetryConfig {
        jitter_ms: 0,
        ..RetryConfig::default()
    })
}

#[tokio::test(start_paused = true)]
async fn test_breaker_threshold_two_scenario() {
    let breaker = CircuitBreaker::with_timeout(2, Duration::from_secs(30));
    breaker.record_failure("x");
    breaker.record_failure("x");
    assert!(breaker.is_open("x"));

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(!breaker.is_open("x"));
    // 探测尚未结束，不再放行
    assert!(breaker.is_open("x"));
}

#[tokio::test(start_paused = true)]
async fn test_outage_recovers_within_retry_budget() {
    let breaker = Arc::new(CircuitBreaker::with_timeout(5, Duration::from_secs(60)));
    let (exec, calls) = executor(2, breaker.clone(), quick_retry());
    let start = tokio::time::Instant::now();

    let out = exec
        .execute("get_weather", serde_json::json!({"city": "Seattle"}))
        .await;
    assert_eq!(
        out,
        ToolCallOutcome::Success {
            payload: "Seattle: 62F, rainy".into()
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 1s + 2s 退避
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(breaker.failure_count("get_weather"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sustained_outage_opens_then_recovers() {
    let breaker = Arc::new(CircuitBreaker::with_timeout(5, Duration::from_secs(60)));
    let (exec, calls) = executor(5, breaker.clone(), quick_retry());
    let args = serde_json::json!({"city": "Seattle"});

    let first = exec.execute("get_weather", args.clone()).await;
    assert!(matches!(first, ToolCallOutcome::RetryableFailure { .. }));
    assert!(first.render().ends_with("(all retries exhausted)"));

    // 第 4、5 次失败后熔断打开，第三次尝试被拦下
    let second = exec.execute("get_weather", args.clone()).await;
    assert!(matches!(second, ToolCallOutcome::PermanentFailure { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(breaker.status("get_weather"), CircuitStatus::Open);

    let fast = exec.execute("get_weather", args.clone()).await;
    assert_eq!(
        fast.render(),
        "Error: get_weather is currently unavailable, please try again later"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    tokio::time::advance(Duration::from_secs(60)).await;
    let probe = exec.execute("get_weather", args).await;
    assert!(probe.is_success());
    assert_eq!(breaker.status("get_weather"), CircuitStatus::Closed);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let breaker = Arc::new(CircuitBreaker::with_timeout(5, Duration::from_secs(60)));
    let (exec, calls) = executor(0, breaker.clone(), quick_retry());
    let out = exec
        .execute("get_weather", serde_json::json!({"city": "Atlantis"}))
        .await;
    assert_eq!(out.render(), "Error: unknown city: Atlantis");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.failure_count("get_weather"), 1);
}

#[tokio::test]
async fn test_executors_share_breaker_state() {
    let breaker = Arc::new(CircuitBreaker::with_timeout(6, Duration::from_secs(60)));
    let (a, _) = executor(u32::MAX, breaker.clone(), RetryPolicy::no_retry());
    let (b, _) = executor(u32::MAX, breaker.clone(), RetryPolicy::no_retry());
    let a = Arc::new(a);
    let b = Arc::new(b);

    let mut calls = Vec::new();
    for i in 0..6 {
        let exec = if i % 2 == 0 { a.clone() } else { b.clone() };
        calls.push(async move { exec.execute("get_weather", Value::Null).await });
    }
    let outcomes = futures_util::future::join_all(calls).await;
    assert!(outcomes.iter().all(|o| !o.is_success()));
    assert_eq!(breaker.failure_count("get_weather"), 6);
    assert!(breaker.is_open("get_weather"));
}

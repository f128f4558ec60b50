//! 重试策略：有界重试 + 指数退避 + 随机抖动
//!
//! 只有可重试错误（ToolError::Retryable / Timeout）会再次尝试；永久与未分类错误立即返回。
//! 第 n 次失败后的等待：min(max_delay, base_delay * 2^(n-1)) + [0, jitter]；
//! 错误带有 retry_after（限流）时至少等待该时长。

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

use crate::tools::ToolError;

/// [retry] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 最多尝试次数（含首次）
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 额外随机抖动上限，0 表示不加抖动
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            jitter_ms: 1000,
        }
    }
}

/// 一次带重试的调用结果与实际尝试次数
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T, ToolError>,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// 不重试：只尝试一次
    pub fn no_retry() -> Self {
        Self::new(&RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 第 attempt 次（从 1 开始）失败后的退避时长，不含抖动
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// 按策略执行 op(attempt)；可重试错误在次数内退避后重试，其余错误立即返回
    pub async fn retry<T, F, Fut>(&self, label: &str, mut op: F) -> RetryReport<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => {
                    return RetryReport {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = match e.retry_after() {
                        Some(hint) => hint.max(self.delay_with_jitter(attempt)),
                        None => self.delay_with_jitter(attempt),
                    };
                    tracing::warn!(
                        target_name = %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return RetryReport {
                        result: Err(e),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            jitter_ms: 0,
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy(10);
        assert_eq!(p.backoff(1), Duration::from_secs(1));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
        assert_eq!(p.backoff(4), Duration::from_secs(8));
        assert_eq!(p.backoff(5), Duration::from_secs(10));
        assert_eq!(p.backoff(64), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let p = RetryPolicy::default();
        for _ in 0..50 {
            let d = p.delay_with_jitter(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_is_attempted_max_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let start = tokio::time::Instant::now();
        let report: RetryReport<String> = policy(3)
            .retry("flaky", move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ToolError::Retryable("503".into()))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.result, Err(ToolError::Retryable("503".into())));
        // 1s + 2s 退避
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_is_attempted_once() {
        let report: RetryReport<String> = policy(3)
            .retry("strict", |_| async { Err(ToolError::Permanent("bad input".into())) })
            .await;
        assert_eq!(report.attempts, 1);

        let report: RetryReport<String> = policy(3)
            .retry("odd", |_| async { Err(ToolError::Unclassified("boom".into())) })
            .await;
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let report = policy(3)
            .retry("flaky", |attempt| async move {
                if attempt < 2 {
                    Err(ToolError::Timeout("slow".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(report.result, Ok(2));
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_extends_backoff() {
        let start = tokio::time::Instant::now();
        let report = policy(3)
            .retry("llm", |attempt| async move {
                if attempt < 2 {
                    Err(ToolError::RateLimited {
                        message: "429".into(),
                        retry_after: Duration::from_secs(5),
                    })
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(report.result, Ok(2));
        // 服务端要求 5s，大于 1s 的指数退避
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}

//! 熔断器：按能力名跟踪连续失败并快速失败
//!
//! 状态（由字段推导，不单独存储）：
//! - CLOSED：正常调用
//! - OPEN：连续失败达到阈值，在 timeout 内直接拒绝
//! - HALF_OPEN：超时后放行一次探测调用；成功回到 CLOSED，失败重新 OPEN
//!
//! 每个能力名一把锁，不同能力之间互不阻塞；实例显式构造并通过 Arc 共享给执行器。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// [breaker] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// 连续失败多少次后打开
    pub failure_threshold: u32,
    /// 打开后多久允许探测（秒）
    pub timeout_secs: u64,
    /// 永久失败（参数错误、鉴权等）是否也计入熔断
    pub permanent_failures_trip: bool,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
            permanent_failures_trip: true,
        }
    }
}

/// 对外可见的熔断状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct CircuitState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// HALF_OPEN 下已放行的探测调用尚未结束
    probe_in_flight: bool,
}

/// 熔断器
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    timeout: Duration,
    circuits: RwLock<HashMap<String, Arc<Mutex<CircuitState>>>>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self::with_timeout(config.failure_threshold, Duration::from_secs(config.timeout_secs))
    }

    pub fn with_timeout(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            timeout,
            circuits: RwLock::new(HashMap::new()),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    fn circuit(&self, name: &str) -> Arc<Mutex<CircuitState>> {
        if let Some(c) = self
            .circuits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return c.clone();
        }
        self.circuits
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn existing(&self, name: &str) -> Option<Arc<Mutex<CircuitState>>> {
        self.circuits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn with_state<R>(&self, name: &str, f: impl FnOnce(&mut CircuitState) -> R) -> R {
        let circuit = self.circuit(name);
        let mut state = circuit.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// 调用成功：清零失败计数并关闭熔断
    pub fn record_success(&self, name: &str) {
        self.with_state(name, |s| {
            let was_tripped = s.opened_at.is_some() || s.consecutive_failures >= self.failure_threshold;
            s.consecutive_failures = 0;
            s.opened_at = None;
            s.probe_in_flight = false;
            if was_tripped {
                tracing::info!(capability = %name, "circuit breaker CLOSED");
            }
        });
    }

    /// 调用失败：计数 +1，达到阈值时打开（HALF_OPEN 探测失败也会重新打开）
    pub fn record_failure(&self, name: &str) {
        self.with_state(name, |s| {
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            s.probe_in_flight = false;
            if s.consecutive_failures >= self.failure_threshold {
                s.opened_at = Some(Instant::now());
                tracing::warn!(
                    capability = %name,
                    failures = s.consecutive_failures,
                    "circuit breaker OPENED"
                );
            }
        });
    }

    /// 探测调用以不计入熔断的方式结束时释放名额，下一次检查可再放行一次探测
    pub fn release_probe(&self, name: &str) {
        if let Some(circuit) = self.existing(name) {
            circuit
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .probe_in_flight = false;
        }
    }

    /// 是否应快速失败
    ///
    /// OPEN 且未超时返回 true；超时后的首次检查清除打开标记、进入 HALF_OPEN 并返回 false（放行一次探测），
    /// 探测结束前的其它检查返回 true。
    pub fn is_open(&self, name: &str) -> bool {
        let Some(circuit) = self.existing(name) else {
            return false;
        };
        let mut s = circuit.lock().unwrap_or_else(PoisonError::into_inner);
        match s.opened_at {
            Some(opened_at) => {
                if opened_at.elapsed() >= self.timeout {
                    s.opened_at = None;
                    s.probe_in_flight = true;
                    tracing::info!(capability = %name, "circuit breaker entering HALF_OPEN");
                    false
                } else {
                    true
                }
            }
            None if s.consecutive_failures >= self.failure_threshold => {
                if s.probe_in_flight {
                    true
                } else {
                    s.probe_in_flight = true;
                    false
                }
            }
            None => false,
        }
    }

    /// 推导当前状态（只读，不触发状态迁移）
    pub fn status(&self, name: &str) -> CircuitStatus {
        let Some(circuit) = self.existing(name) else {
            return CircuitStatus::Closed;
        };
        let s = circuit.lock().unwrap_or_else(PoisonError::into_inner);
        match s.opened_at {
            Some(opened_at) if opened_at.elapsed() < self.timeout => CircuitStatus::Open,
            Some(_) => CircuitStatus::HalfOpen,
            None if s.consecutive_failures >= self.failure_threshold => CircuitStatus::HalfOpen,
            None => CircuitStatus::Closed,
        }
    }

    pub fn failure_count(&self, name: &str) -> u32 {
        self.existing(name)
            .map(|c| c.lock().unwrap_or_else(PoisonError::into_inner).consecutive_failures)
            .unwrap_or(0)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(&BreakerConfig::default())
    }
}

//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info，RUST_LOG 可覆盖；重复初始化时静默忽略（测试中多次调用安全）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 人类可读格式
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer())
        .try_init();
}

/// JSON 行格式（便于日志采集；工具审计行也以 JSON 字段输出）
pub fn init_json() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json())
        .try_init();
}

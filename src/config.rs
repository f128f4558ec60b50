//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `KEEL__*` 覆盖（双下划线表示嵌套，如 `KEEL__BREAKER__FAILURE_THRESHOLD=3`）。
//! 各段缺省时取代码内默认值。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{BreakerConfig, RetryConfig};
use crate::memory::ContextConfig;
use crate::react::ReactConfig;
use crate::tools::ToolsConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub context: ContextConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub react: ReactConfig,
    pub tools: ToolsConfig,
    pub llm: LlmSection,
    pub memory: MemorySection,
}

impl AppConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.tool_timeout_secs)
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：mock / openai
    pub provider: String,
    pub model: String,
    /// OpenAI 兼容端点，未设置时用官方地址
    pub base_url: Option<String>,
    /// 未设置时读 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key: None,
            request_timeout_secs: 60,
        }
    }
}

/// [memory] 段：持久化目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub data_dir: PathBuf,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./memory_data"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 KEEL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 KEEL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("KEEL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

//! Echo 工具（测试与演示用）

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ParameterSpec, Tool, ToolError};

/// Echo 工具：回显 text 参数；缺少 text 视为参数错误（永久失败）
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back unchanged"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::required("text", "string", "Text to echo")]
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        args.get("text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ToolError::Permanent("missing required argument: text".to_string()))
    }
}

//! 工具层：调用请求与结果、注册表、弹性执行器

pub mod call;
pub mod echo;
pub mod executor;
pub mod registry;

pub use call::{ToolCallOutcome, ToolCallRequest, ToolError};
pub use echo::EchoTool;
pub use executor::{ToolExecutor, ToolsConfig};
pub use registry::{ParameterSpec, Tool, ToolRegistry, ToolSchema};

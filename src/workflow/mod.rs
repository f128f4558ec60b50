//! 执行计划：类型、依赖图拓扑排序、任务分类

pub mod classifier;
pub mod graph;
pub mod types;

pub use classifier::{KeywordClassifier, TaskClassifier};
pub use graph::{topological_order, PlanGraph};
pub use types::*;

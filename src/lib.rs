//! Hive - 工具调用型智能体编排
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: 模型客户端抽象（流式回复、工具调用块）与 Mock
//! - **memory**: 对话日志（多块内容的记录、工具调用与结果按 id 对应）
//! - **observability**: tracing 初始化
//! - **react**: 模型调用适配、提示词、编排状态机（选择/评估 与 ReAct）
//! - **tools**: 工具 trait、注册表、执行器与内置工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use react::{
    LoopShape, MemoryPolicy, OrchestrationConfig, OrchestrationResult, OrchestrationStatus,
    Orchestrator,
};

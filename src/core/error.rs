//! 编排错误类型
//!
//! 除 Cancelled 外，所有错误都会在编排循环内被吸收：工具类错误变成 ERROR 执行记录，
//! 模型解析错误变成「零调用」回复，其余错误在运行顶层转为 FAILED 结果。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排运行过程中可能出现的错误（工具、模型、取消、启动校验等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 调用了未注册的工具
    #[error("Unknown tool: {0}")]
    ToolLookup(String),

    #[error("Tool invocation is missing a name")]
    MissingToolName,

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 模型回复无法解析为「推理文本 + 工具调用」
    #[error("Model parse error: {0}")]
    ModelParse(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 调用方主动取消；唯一会被重新抛出的错误
    #[error("Cancelled by user")]
    Cancelled,

    /// 运行前置条件不满足（如没有注册任何工具），本次运行直接失败
    #[error("Run setup error: {0}")]
    RunSetup(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_converts() {
        let err: AgentError = LlmError::Request("connection reset".to_string()).into();
        assert!(matches!(err, AgentError::Llm(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_only_cancelled_is_cancelled() {
        assert!(AgentError::Cancelled.is_cancelled());
        assert!(!AgentError::RunSetup("no tools".to_string()).is_cancelled());
    }
}

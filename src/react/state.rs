//! 运行状态与结果
//!
//! RunState 在一次运行开始时创建、结束时消费，避免跨运行泄漏；
//! ExecutionRecord 只追加不修改；OrchestrationResult 在运行结束时生成一次。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::{ContentBlock, Turn};
use crate::tools::ToolInvocation;

/// 单次工具执行的状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// 一次工具执行的不可变记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub tool_name: String,
    pub tool_args: Value,
    pub result: String,
    pub status: ExecutionStatus,
}

impl ExecutionRecord {
    pub fn new(invocation: &ToolInvocation, result: String, success: bool) -> Self {
        Self {
            tool_name: invocation.name.clone(),
            tool_args: invocation.args(),
            result,
            status: if success {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Error
            },
        }
    }
}

/// 运行终态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrchestrationStatus {
    Completed,
    Exhausted,
    Failed,
}

/// 一次运行的最终结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub status: OrchestrationStatus,
    pub summary: String,
    #[serde(rename = "all_execution_results")]
    pub trace: Vec<ExecutionRecord>,
    pub agent_name: String,
    /// 仅当结束工具被成功调用时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_turn: Option<Turn>,
}

impl OrchestrationResult {
    /// FAILED 结果：一行可读信息，执行记录为空
    pub fn failed(agent_name: &str, error: impl std::fmt::Display) -> Self {
        Self {
            status: OrchestrationStatus::Failed,
            summary: format!("{} execution error: {}", agent_name, error),
            trace: Vec::new(),
            agent_name: agent_name.to_string(),
            terminal_turn: None,
        }
    }

    /// 跨进程 / API 边界时的文本载荷：缩进 JSON
    pub fn to_response_text(&self) -> String {
        let payload = serde_json::json!({
            "all_execution_results": self.trace,
            "summary": self.summary,
            "agent_name": self.agent_name,
            "status": self.status,
        });
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| self.summary.clone())
    }

    /// 包装为单个文本块的记录
    pub fn to_response_turn(&self) -> Turn {
        Turn::assistant(
            self.agent_name.clone(),
            vec![ContentBlock::text(self.to_response_text())],
        )
    }
}

/// 单次运行的可变状态（单一所有者）
#[derive(Debug, Default)]
pub struct RunState {
    /// 已完成的 评估→再执行 轮数（ReAct 形态下为推理轮数）
    pub iteration: usize,
    pub trace: Vec<ExecutionRecord>,
    pub terminal_turn: Option<Turn>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ExecutionRecord) {
        self.trace.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_text_shape() {
        let inv = ToolInvocation::new(
            "c1",
            "read_file",
            json!({"path": "X"}).as_object().cloned().unwrap(),
        );
        let result = OrchestrationResult {
            status: OrchestrationStatus::Completed,
            summary: "ok".to_string(),
            trace: vec![ExecutionRecord::new(&inv, "hello world".to_string(), true)],
            agent_name: "files".to_string(),
            terminal_turn: None,
        };
        let text = result.to_response_text();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["all_execution_results"][0]["tool_name"], "read_file");
        assert_eq!(parsed["all_execution_results"][0]["status"], "SUCCESS");
        assert_eq!(parsed["all_execution_results"][0]["tool_args"]["path"], "X");
        assert_eq!(parsed["agent_name"], "files");
        assert_eq!(parsed["status"], "COMPLETED");
        assert!(text.contains("\n  "));
    }

    #[test]
    fn test_response_turn_wraps_payload() {
        let result = OrchestrationResult::failed("search", "boom");
        let turn = result.to_response_turn();
        assert_eq!(turn.speaker_name, "search");
        assert_eq!(turn.role, crate::memory::Role::Assistant);
        assert_eq!(turn.content.len(), 1);
        assert_eq!(turn.text(), result.to_response_text());
    }

    #[test]
    fn test_failed_summary_names_agent() {
        let r = OrchestrationResult::failed("search", "boom");
        assert_eq!(r.summary, "search execution error: boom");
        assert!(r.trace.is_empty());
        assert_eq!(r.status, OrchestrationStatus::Failed);
    }
}

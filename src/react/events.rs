//! 编排过程事件：用于流式展示思考、工具调用、观察与终态

use serde::Serialize;

use crate::react::OrchestrationStatus;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 迭代轮数更新
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用模型
    Thinking,
    /// 模型的推理文本（预览）
    ThinkingContent { text: String },
    /// 调用工具
    ToolCall {
        id: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        id: String,
        tool: String,
        preview: String,
    },
    /// 工具执行失败
    ToolFailure {
        id: String,
        tool: String,
        reason: String,
    },
    /// 分块观察：正在喂第 index 块（从 1 开始）
    ObservationChunk { index: usize, total: usize },
    /// 对话日志被摘要压缩
    Compaction { turns_before: usize },
    /// 迭代用尽，正在生成兜底总结
    Summarizing { iterations: usize },
    /// 推理被中断，已为未执行的工具调用补写结果
    Interrupted { pending_tools: usize },
    /// 运行结束
    Finished { status: OrchestrationStatus },
    /// 错误
    Error { text: String },
}

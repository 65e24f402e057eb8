//! 编排层：模型调用适配、提示词、运行状态、主循环（选择/评估 与 ReAct 两种形态）

pub mod caller;
pub mod events;
pub mod loop_;
pub mod observation;
pub mod prompts;
pub mod state;

pub use caller::{
    normalize_tool_use, parse_text_protocol, ModelCaller, ModelOutcome, PartialReply,
    SelectionOutcome,
};
pub use events::ReactEvent;
pub use loop_::{
    LoopShape, MemoryPolicy, OrchestrationConfig, Orchestrator, INTERRUPTED_RESULT,
};
pub use observation::{split_chunks, Observer};
pub use state::{
    ExecutionRecord, ExecutionStatus, OrchestrationResult, OrchestrationStatus, RunState,
};

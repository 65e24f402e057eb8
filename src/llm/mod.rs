//! 模型层：客户端抽象与脚本化 Mock 实现

pub mod mock;
pub mod traits;

pub use mock::{MockLlmClient, MockStep};
pub use traits::{
    LlmClient, LlmError, ModelReply, ModelRequest, ReplyChunk, ReplyStream, ToolArguments,
    ToolUseChunk,
};

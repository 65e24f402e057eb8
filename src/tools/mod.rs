pub mod delegate;
pub mod echo;
pub mod executor;
pub mod filesystem;
pub mod finish;
pub mod registry;
pub mod schema;

pub use delegate::{DelegateTool, DEFAULT_DELEGATE_TIMEOUT_SECS};
pub use echo::EchoTool;
pub use executor::{ToolExecutor, ToolInvocation};
pub use filesystem::{ListDirTool, ReadFileTool, SafeFs};
pub use finish::{finish_payload, FinishTool, DEFAULT_FINISH_TOOL};
pub use registry::{Tool, ToolOutput, ToolRegistry, ToolResponse, ToolResponseStream};
pub use schema::{parameters_schema_for, text_protocol_schema_json, ToolSchema};

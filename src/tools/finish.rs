//! 结束工具：模型成功调用它即表示给出最终回答
//!
//! 回答文本放在结果的 metadata.response 中，编排循环据此生成面向用户的终止记录。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{parameters_schema_for, Tool, ToolOutput, ToolResponse};

pub const DEFAULT_FINISH_TOOL: &str = "generate_response";

#[derive(Debug, Deserialize, JsonSchema)]
struct FinishArgs {
    /// 给用户的最终回答
    response: String,
}

/// 结束工具（默认名 generate_response）
pub struct FinishTool {
    name: String,
}

impl FinishTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for FinishTool {
    fn default() -> Self {
        Self::new(DEFAULT_FINISH_TOOL)
    }
}

/// 从结束工具的结果中取出最终回答
pub fn finish_payload(metadata: Option<&Value>) -> Option<String> {
    metadata?
        .get("response")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Generate the final response to the user and finish the task. Args: {\"response\": \"answer\"}"
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<FinishArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let parsed: FinishArgs =
            serde_json::from_value(args).map_err(|e| format!("invalid arguments: {}", e))?;
        Ok(ToolResponse::text("Successfully generated response.")
            .with_metadata(json!({ "success": true, "response": parsed.response }))
            .into())
    }
}

//! 工具描述与调用格式 Schema（schemars 自动生成）
//!
//! ToolSchema 随模型请求一起发送；text_protocol_schema_json 用于不支持原生 function calling 的模型，
//! 把「合法 tool call」的 JSON 结构注入 system prompt，减少输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 发送给模型的工具描述：名称、说明、参数 JSON Schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// 文本协议下的工具调用格式：`{"tool": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 read_file、echo、generate_response
    pub tool: String,
    /// 工具参数，依工具不同而不同
    pub args: HashMap<String, Value>,
}

/// 返回文本协议工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn text_protocol_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 由参数结构体生成工具参数 schema
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| {
        serde_json::json!({ "type": "object", "properties": {} })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_protocol_schema_mentions_fields() {
        let schema = text_protocol_schema_json();
        assert!(schema.contains("\"tool\""));
        assert!(schema.contains("\"args\""));
    }

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    struct PathArgs {
        path: String,
    }

    #[test]
    fn test_parameters_schema_for_struct() {
        let schema = parameters_schema_for::<PathArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["path"].is_object());
    }
}

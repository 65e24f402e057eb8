//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 工具可以一次性返回结果，也可以返回一个有限的结果流（增量进度），最后一个元素为准。

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use serde_json::Value;

use crate::memory::{render_blocks, ContentBlock};
use crate::tools::ToolSchema;

/// 单个工具结果：内容块、成功标志、可选的旁路数据
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResponse {
    pub content: Vec<ContentBlock>,
    pub success: bool,
    pub metadata: Option<Value>,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            success: true,
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(message)],
            success: false,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// 结果文本（写入执行记录）
    pub fn render(&self) -> String {
        render_blocks(&self.content)
    }
}

pub type ToolResponseStream = Pin<Box<dyn Stream<Item = ToolResponse> + Send>>;

/// 工具输出：一次性或流式
pub enum ToolOutput {
    Once(ToolResponse),
    Stream(ToolResponseStream),
}

impl ToolOutput {
    /// 统一为结果流
    pub fn into_stream(self) -> ToolResponseStream {
        match self {
            ToolOutput::Once(response) => Box::pin(stream::iter(vec![response])),
            ToolOutput::Stream(s) => s,
        }
    }
}

impl From<ToolResponse> for ToolOutput {
    fn from(response: ToolResponse) -> Self {
        ToolOutput::Once(response)
    }
}

/// 工具 trait：名称、描述（供模型理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认为无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 单次调用的超时预算；None 时用执行器的默认值
    fn timeout(&self) -> Option<std::time::Duration> {
        None
    }

    /// 执行工具；Err 会被执行器转为失败结果，不会中断编排
    async fn execute(&self, args: Value) -> Result<ToolOutput, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous one replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 按名称排序，保证 prompt 稳定
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| {
                self.tools.get(&name).map(|tool| {
                    ToolSchema::new(name.clone(), tool.description(), tool.parameters_schema())
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[test]
    fn test_register_and_schemas_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(crate::tools::FinishTool::default());
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("echo"));
        let names: Vec<String> = registry.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["echo", "generate_response"]);
    }

    #[test]
    fn test_error_response_not_success() {
        let r = ToolResponse::error("nope");
        assert!(!r.success);
        assert_eq!(r.render(), "nope");
    }
}

//! 模型协作者抽象
//!
//! 所有模型后端实现 LlmClient：complete（一次性回复）、complete_stream（分块回复）。
//! 回复由推理文本与若干工具调用块组成；参数可能是已解析的对象，也可能是原始 JSON 文本。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::memory::Turn;
use crate::tools::ToolSchema;

/// 模型调用失败（网络、流中断等）；解析失败不在此列
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// 一次模型请求：system 指令 + 对话快照 + 可选的工具 schema
#[derive(Clone, Debug, Serialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub tool_schemas: Option<Vec<ToolSchema>>,
}

impl ModelRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        history: Vec<Turn>,
        tool_schemas: Option<Vec<ToolSchema>>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history,
            tool_schemas,
        }
    }
}

/// 工具调用参数：已解析对象，或 function-calling API 常见的原始 JSON 字符串
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Object(Map<String, Value>),
    Raw(String),
}

impl Default for ToolArguments {
    fn default() -> Self {
        ToolArguments::Object(Map::new())
    }
}

/// 模型回复中的一个工具调用块（未经规范化，id / name 可能缺失）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUseChunk {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolUseChunk {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        let arguments = match input {
            Value::Object(map) => ToolArguments::Object(map),
            other => ToolArguments::Raw(other.to_string()),
        };
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            arguments,
        }
    }

    pub fn raw(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: ToolArguments::Raw(arguments.into()),
        }
    }
}

/// 一次性回复
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_uses: Vec<ToolUseChunk>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_uses: Vec::new(),
        }
    }

    pub fn with_tool_use(mut self, tool_use: ToolUseChunk) -> Self {
        self.tool_uses.push(tool_use);
        self
    }

    /// 拆成流式分块：先文本，再逐个工具调用
    pub fn into_chunks(self) -> Vec<ReplyChunk> {
        let mut chunks = Vec::with_capacity(self.tool_uses.len() + 1);
        if !self.text.is_empty() {
            chunks.push(ReplyChunk::Text(self.text));
        }
        chunks.extend(self.tool_uses.into_iter().map(ReplyChunk::ToolUse));
        chunks
    }
}

/// 流式回复分块：文本增量或完整的工具调用块
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyChunk {
    Text(String),
    ToolUse(ToolUseChunk),
}

pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<ReplyChunk, LlmError>> + Send>>;

/// 模型客户端 trait：一次性与流式两种调用
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 一次性完成
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError>;

    /// 流式完成；默认把 complete 的结果按块回放
    async fn complete_stream(&self, request: &ModelRequest) -> Result<ReplyStream, LlmError> {
        let reply = self.complete(request).await?;
        Ok(Box::pin(stream::iter(reply.into_chunks().into_iter().map(Ok))))
    }

    fn name(&self) -> &str {
        "llm"
    }
}

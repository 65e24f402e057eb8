//! Mock 模型客户端（用于测试与本地演示，无需 API）
//!
//! 按脚本依次返回回复；脚本用完后要么重复固定回复，要么走 echo 回退：
//! 提供了 echo 工具时把最后一条用户输入回显为工具调用，最后一条是工具结果时直接汇报结果。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};
use serde_json::json;

use crate::llm::{LlmClient, LlmError, ModelReply, ModelRequest, ReplyChunk, ReplyStream, ToolUseChunk};
use crate::memory::{render_blocks, Role};

/// 脚本中的一步
#[derive(Clone, Debug)]
pub enum MockStep {
    /// 一次性回复
    Reply(ModelReply),
    /// 分块回复
    Stream(Vec<ReplyChunk>),
    /// 发出这些分块后永远挂起（用于测试取消）
    StreamThenHang(Vec<ReplyChunk>),
    /// 调用失败
    Fail(LlmError),
}

/// 脚本化 Mock 客户端，记录收到的每个请求
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<MockStep>>,
    repeat: Option<ModelReply>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockLlmClient {
    /// 纯 echo 回退，无脚本
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(steps: impl IntoIterator<Item = MockStep>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 便捷构造：每一步都是一次性回复
    pub fn with_replies(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self::scripted(replies.into_iter().map(MockStep::Reply))
    }

    /// 脚本用完后一直返回该回复
    pub fn repeating(reply: ModelReply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn next_step(&self, request: &ModelRequest) -> MockStep {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match (scripted, &self.repeat) {
            (Some(step), _) => step,
            (None, Some(reply)) => MockStep::Reply(reply.clone()),
            (None, None) => MockStep::Reply(echo_reply(request)),
        }
    }
}

/// echo 回退：最后一条是工具结果则汇报；提供 echo 工具则回显用户输入；否则给出文本总结
fn echo_reply(request: &ModelRequest) -> ModelReply {
    if let Some(last) = request.history.last() {
        if last.role == Role::Tool {
            return ModelReply::text(format!("Done: {}", render_blocks(&last.content)));
        }
    }
    let last_user = request
        .history
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.text())
        .unwrap_or_else(|| "(no input)".to_string());
    let has_echo = request
        .tool_schemas
        .as_ref()
        .is_some_and(|tools| tools.iter().any(|t| t.name == "echo"));
    if has_echo {
        ModelReply::text("Echoing the request.").with_tool_use(ToolUseChunk {
            id: None,
            name: Some("echo".to_string()),
            arguments: crate::llm::ToolArguments::Object(
                json!({ "text": format!("Echo from Mock: {}", last_user) })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            ),
        })
    } else {
        ModelReply::text(format!("Summary: {}", last_user))
    }
}

fn fold_chunks(chunks: Vec<ReplyChunk>) -> ModelReply {
    let mut reply = ModelReply::default();
    for chunk in chunks {
        match chunk {
            ReplyChunk::Text(t) => reply.text.push_str(&t),
            ReplyChunk::ToolUse(t) => reply.tool_uses.push(t),
        }
    }
    reply
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        match self.next_step(request) {
            MockStep::Reply(reply) => Ok(reply),
            MockStep::Stream(chunks) => Ok(fold_chunks(chunks)),
            MockStep::StreamThenHang(_) => future::pending().await,
            MockStep::Fail(e) => Err(e),
        }
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<ReplyStream, LlmError> {
        match self.next_step(request) {
            MockStep::Reply(reply) => Ok(Box::pin(stream::iter(
                reply.into_chunks().into_iter().map(Ok),
            ))),
            MockStep::Stream(chunks) => Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok)))),
            MockStep::StreamThenHang(chunks) => Ok(Box::pin(
                stream::iter(chunks.into_iter().map(Ok)).chain(stream::pending()),
            )),
            MockStep::Fail(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

//! ModelCaller：模型调用适配器
//!
//! 拼 system + 对话快照 + 工具 schema 调用模型；流式回复在内部完整消费（文本拼接、工具调用块逐个收集），
//! 调用方只看到「推理文本 + 工具调用列表」。回复无法解析时不抛错，而是返回零调用并把原因放进推理文本，
//! 这样编排循环的「无调用即结束」规则依然成立。

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{LlmClient, ModelRequest, ReplyChunk, ToolArguments, ToolUseChunk};
use crate::memory::Turn;
use crate::tools::{ToolInvocation, ToolSchema};

/// 规范化后的模型回复
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelOutcome {
    pub reasoning: String,
    pub invocations: Vec<ToolInvocation>,
    /// 解析失败原因；此时 invocations 为空，reasoning 为失败说明
    pub parse_error: Option<String>,
}

impl ModelOutcome {
    fn parse_failure(reason: String) -> Self {
        Self {
            reasoning: reason.clone(),
            invocations: Vec::new(),
            parse_error: Some(reason),
        }
    }

    pub fn into_selection(self) -> SelectionOutcome {
        if self.invocations.is_empty() {
            SelectionOutcome::Done(self.reasoning)
        } else {
            SelectionOutcome::Continue {
                reasoning: self.reasoning,
                invocations: self.invocations,
            }
        }
    }
}

/// 选择 / 评估阶段的分支：结束，或继续执行这批调用
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionOutcome {
    Done(String),
    Continue {
        reasoning: String,
        invocations: Vec<ToolInvocation>,
    },
}

/// 调用进行中已收到的部分回复；取消时据此补写中断结果
#[derive(Clone, Debug, Default)]
pub struct PartialReply {
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
    pub parse_error: Option<String>,
}

impl PartialReply {
    fn absorb(&mut self, chunk: ReplyChunk) {
        match chunk {
            ReplyChunk::Text(delta) => self.text.push_str(&delta),
            ReplyChunk::ToolUse(tool_use) => match normalize_tool_use(tool_use) {
                Ok(invocation) => self.invocations.push(invocation),
                Err(e) => {
                    tracing::warn!(error = %e, "malformed tool use block in model reply");
                    self.parse_error.get_or_insert_with(|| e.to_string());
                }
            },
        }
    }
}

/// 模型调用适配器：持有模型客户端，负责请求拼装与回复规范化
pub struct ModelCaller {
    llm: Arc<dyn LlmClient>,
    streaming: bool,
    text_protocol: bool,
}

impl ModelCaller {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            streaming: true,
            text_protocol: false,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// 对不支持原生 function calling 的模型，从回复文本中解析 JSON 工具调用
    pub fn with_text_protocol(mut self, enabled: bool) -> Self {
        self.text_protocol = enabled;
        self
    }

    pub fn text_protocol(&self) -> bool {
        self.text_protocol
    }

    pub fn model_name(&self) -> &str {
        self.llm.name()
    }

    /// 不可取消的调用
    pub async fn call(
        &self,
        system_prompt: &str,
        history: &[Turn],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ModelOutcome, AgentError> {
        let mut partial = PartialReply::default();
        self.call_cancellable(system_prompt, history, tools, &CancellationToken::new(), &mut partial)
            .await
    }

    /// 可取消的调用：边消费边把已解析的工具调用记入 partial；取消时返回 Cancelled，partial 保留已收到的部分
    pub async fn call_cancellable(
        &self,
        system_prompt: &str,
        history: &[Turn],
        tools: Option<&[ToolSchema]>,
        cancel: &CancellationToken,
        partial: &mut PartialReply,
    ) -> Result<ModelOutcome, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let request = ModelRequest::new(system_prompt, history.to_vec(), tools.map(<[_]>::to_vec));
        tracing::debug!(
            model = %self.model_name(),
            history = request.history.len(),
            tools = request.tool_schemas.as_ref().map(Vec::len).unwrap_or(0),
            streaming = self.streaming,
            "model call"
        );

        if self.streaming {
            let mut chunks = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                r = self.llm.complete_stream(&request) => r?,
            };
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    n = chunks.next() => n,
                };
                match next {
                    Some(Ok(chunk)) => partial.absorb(chunk),
                    Some(Err(e)) => return Err(e.into()),
                    None => break,
                }
            }
        } else {
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                r = self.llm.complete(&request) => r?,
            };
            for chunk in reply.into_chunks() {
                partial.absorb(chunk);
            }
        }

        Ok(self.normalize(std::mem::take(partial)))
    }

    fn normalize(&self, partial: PartialReply) -> ModelOutcome {
        if let Some(reason) = partial.parse_error {
            return ModelOutcome::parse_failure(reason);
        }
        let reasoning = partial.text.trim().to_string();
        if partial.invocations.is_empty() && self.text_protocol {
            return match parse_text_protocol(&reasoning) {
                Ok(invocations) => ModelOutcome {
                    reasoning,
                    invocations,
                    parse_error: None,
                },
                Err(e) => ModelOutcome::parse_failure(e.to_string()),
            };
        }
        ModelOutcome {
            reasoning,
            invocations: partial.invocations,
            parse_error: None,
        }
    }
}

fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// 规范化单个工具调用块：补 id，缺失的 name 留空（由执行器拒绝），参数必须是 JSON 对象
pub fn normalize_tool_use(chunk: ToolUseChunk) -> Result<ToolInvocation, AgentError> {
    let id = chunk
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(generate_call_id);
    let name = chunk.name.unwrap_or_default();
    let input = match chunk.arguments {
        ToolArguments::Object(map) => map,
        ToolArguments::Raw(raw) if raw.trim().is_empty() => Map::new(),
        ToolArguments::Raw(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(AgentError::ModelParse(format!(
                    "arguments of tool '{}' must be a JSON object, got: {}",
                    name, other
                )))
            }
            Err(e) => {
                return Err(AgentError::ModelParse(format!(
                    "arguments of tool '{}' are not valid JSON ({}): {}",
                    name, e, raw
                )))
            }
        },
    };
    Ok(ToolInvocation::new(id, name, input))
}

/// 文本协议解析：提取 ```json 块或首尾花括号 / 方括号之间的 JSON，
/// 支持单个 `{"tool": ..., "args": {...}}` 或其数组；没有 JSON 或没有 tool 字段时视为纯文本回复
pub fn parse_text_protocol(output: &str) -> Result<Vec<ToolInvocation>, AgentError> {
    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        let open = trimmed.find(|c| c == '{' || c == '[');
        let close = trimmed.rfind(|c| c == '}' || c == ']');
        match (open, close) {
            (Some(start), Some(end)) if end > start => &trimmed[start..=end],
            _ => return Ok(Vec::new()),
        }
    };

    let parsed: Value = serde_json::from_str(json_str)
        .map_err(|e| AgentError::ModelParse(format!("{}: {}", e, json_str)))?;
    let calls = match parsed {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut invocations = Vec::new();
    for call in calls {
        let Some(name) = call.get("tool").and_then(|v| v.as_str()) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let arguments = match call.get("args") {
            None | Some(Value::Null) => ToolArguments::default(),
            Some(Value::Object(map)) => ToolArguments::Object(map.clone()),
            Some(other) => ToolArguments::Raw(other.to_string()),
        };
        invocations.push(normalize_tool_use(ToolUseChunk {
            id: None,
            name: Some(name.to_string()),
            arguments,
        })?);
    }
    Ok(invocations)
}

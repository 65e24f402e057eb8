//! 工具执行器
//!
//! 持有 ToolRegistry、单次调用超时与可选并发上限。execute(invocation) 返回惰性结果流，
//! 未知工具、缺失工具名、工具报错、超时都被规范为一个失败结果而不是错误；
//! execute_to_completion 取流中最后一个结果，并输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::time::{timeout, timeout_at};

use crate::core::AgentError;
use crate::memory::ContentBlock;
use crate::tools::{ToolRegistry, ToolResponse, ToolResponseStream, ToolSchema};

/// 模型发出的一次工具调用请求（已规范化）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn args(&self) -> Value {
        Value::Object(self.input.clone())
    }

    /// 写入对话日志的 tool_use 块
    pub fn to_block(&self) -> ContentBlock {
        ContentBlock::ToolUse {
            id: self.id.clone(),
            name: self.name.clone(),
            input: self.input.clone(),
        }
    }
}

/// 工具执行器：超时、并发上限，并把所有失败规范为失败结果
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    permits: Option<Arc<Semaphore>>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            permits: None,
        }
    }

    /// 限制同时执行的工具数（并行工具调用时生效）
    pub fn with_concurrency_limit(mut self, max_concurrent: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(max_concurrent.max(1))));
        self
    }

    /// 惰性结果流；调用方拉取直到结束，最后一个元素为准
    pub fn execute(&self, invocation: &ToolInvocation) -> ToolResponseStream {
        if invocation.name.trim().is_empty() {
            return single(ToolResponse::error(AgentError::MissingToolName.to_string()));
        }
        let Some(tool) = self.registry.get(&invocation.name) else {
            return single(ToolResponse::error(
                AgentError::ToolLookup(invocation.name.clone()).to_string(),
            ));
        };
        let args = invocation.args();
        let name = invocation.name.clone();
        let limit = tool.timeout().unwrap_or(self.timeout);
        stream::once(async move {
            match timeout(limit, tool.execute(args)).await {
                Ok(Ok(output)) => output.into_stream(),
                Ok(Err(e)) => single(ToolResponse::error(
                    AgentError::ToolExecutionFailed(e).to_string(),
                )),
                Err(_) => single(ToolResponse::error(AgentError::ToolTimeout(name).to_string())),
            }
        })
        .flatten()
        .boxed()
    }

    /// 拉取整个结果流，保留最后一个结果；每次调用输出 JSON 审计日志
    pub async fn execute_to_completion(&self, invocation: &ToolInvocation) -> ToolResponse {
        let _permit = match &self.permits {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };
        let start = Instant::now();
        // 超时覆盖整个拉取过程，流式工具中途卡住也会转为超时结果
        let deadline = tokio::time::Instant::now() + self.limit_for(&invocation.name);
        let mut results = self.execute(invocation);
        let mut last = None;
        let mut chunks = 0usize;
        loop {
            match timeout_at(deadline, results.next()).await {
                Ok(Some(response)) => {
                    chunks += 1;
                    last = Some(response);
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(tool = %invocation.name, id = %invocation.id, chunks, "tool stream timed out");
                    last = Some(ToolResponse::error(
                        AgentError::ToolTimeout(invocation.name.clone()).to_string(),
                    ));
                    break;
                }
            }
        }
        let response = last.unwrap_or_else(|| {
            ToolResponse::error(
                AgentError::ToolExecutionFailed(format!("{} produced no result", invocation.name))
                    .to_string(),
            )
        });

        let outcome = if response.success {
            "ok"
        } else if response.render().starts_with("Tool timeout") {
            "timeout"
        } else {
            "error"
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": invocation.name,
            "id": invocation.id,
            "ok": response.success,
            "outcome": outcome,
            "chunks": chunks,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&invocation.args()),
        });
        tracing::info!(target: "tool_audit", audit = %audit.to_string(), "tool");
        response
    }

    /// 工具自带的超时预算优先，否则用执行器默认值
    fn limit_for(&self, name: &str) -> Duration {
        self.registry
            .get(name)
            .and_then(|tool| tool.timeout())
            .unwrap_or(self.timeout)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

fn single(response: ToolResponse) -> ToolResponseStream {
    stream::once(future::ready(response)).boxed()
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

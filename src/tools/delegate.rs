//! 委派工具：把一个子编排器包装成工具，供上层管理者按名调用

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::react::{OrchestrationStatus, Orchestrator};
use crate::tools::{parameters_schema_for, Tool, ToolOutput, ToolResponse};

#[derive(Debug, Deserialize, JsonSchema)]
struct DelegateArgs {
    /// 交给子智能体的任务
    objective: String,
    /// 需要原样传递的输入（可选）
    #[serde(default)]
    exact_input: Option<String>,
}

/// 委派任务的默认超时预算（秒）：子编排要跑多轮模型调用，远超单个工具的默认超时
pub const DEFAULT_DELEGATE_TIMEOUT_SECS: u64 = 600;

/// 子编排器工具；同一时刻只跑一个委派任务
pub struct DelegateTool {
    name: String,
    description: String,
    timeout: Duration,
    orchestrator: Mutex<Orchestrator>,
}

impl DelegateTool {
    pub fn new(description: impl Into<String>, orchestrator: Orchestrator) -> Self {
        Self {
            name: orchestrator.name().to_string(),
            description: description.into(),
            timeout: Duration::from_secs(DEFAULT_DELEGATE_TIMEOUT_SECS),
            orchestrator: Mutex::new(orchestrator),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<DelegateArgs>()
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let args: DelegateArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))?;
        let mut orchestrator = self.orchestrator.lock().await;
        let result = orchestrator
            .run(&args.objective, args.exact_input.as_deref())
            .await;
        let text = result.to_response_text();
        let response = if result.status == OrchestrationStatus::Failed {
            ToolResponse::error(text)
        } else {
            ToolResponse::text(text)
        };
        Ok(response
            .with_metadata(json!({ "status": result.status }))
            .into())
    }
}

//! Hive - 命令行入口
//!
//! `hive [objective]`：按配置构建委派形态的编排器，注册内置工具，运行一次并打印 JSON 结果。
//! 当前使用 Mock 模型客户端（回显工具），便于在无外部服务时演示完整流程。

use std::sync::Arc;

use anyhow::Context;
use hive::{
    config::{load_config, AppConfig},
    llm::MockLlmClient,
    observability,
    tools::{EchoTool, ListDirTool, ReadFileTool, SafeFs, ToolRegistry},
    LoopShape, Orchestrator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        AppConfig::default()
    });

    let root = config.filesystem_root();
    std::fs::create_dir_all(&root)
        .with_context(|| format!("Failed to create workspace {}", root.display()))?;
    tracing::info!(root = %SafeFs::new(&root).root().display(), "filesystem tools rooted");

    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    registry.register(ReadFileTool::new(&root));
    registry.register(ListDirTool::new(&root));

    let objective = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let objective = if objective.trim().is_empty() {
        "Say hello".to_string()
    } else {
        objective
    };

    let mut orchestrator = Orchestrator::from_app_config(
        &config,
        LoopShape::SelectEvaluate,
        Arc::new(MockLlmClient::new()),
        registry,
    );
    let result = orchestrator.run(&objective, None).await;
    println!("{}", result.to_response_text());
    Ok(())
}

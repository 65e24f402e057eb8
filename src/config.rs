//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__ORCHESTRATION__MAX_ITERATIONS=8`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub orchestration: OrchestrationSection,
    pub tools: ToolsSection,
}

/// [app] 段：智能体名、工作目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 智能体名，出现在结果与错误信息中
    pub name: String,
    /// 工作目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "hive".to_string(),
            workspace_root: None,
        }
    }
}

/// [orchestration] 段：迭代上限、并行工具调用、分块观察、结束工具、记忆压缩
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestrationSection {
    /// 选择/评估形态的 评估→再执行 轮数上限
    pub max_iterations: usize,
    /// ReAct 形态的推理轮数上限
    pub react_max_iterations: usize,
    /// 同一回复中的多个工具调用是否并发执行
    pub parallel_tool_calls: bool,
    /// 分块观察的块大小（字符）
    pub chunk_size: usize,
    /// 成功调用即结束的工具名
    pub finish_tool_name: String,
    /// 常驻记忆超过此条数时先做一次摘要压缩
    pub compact_threshold: usize,
    /// 是否以流式方式调用模型
    pub streaming: bool,
    /// 是否从回复文本中解析 JSON 工具调用
    pub text_protocol: bool,
    /// 并行时同时执行的工具数上限
    pub max_concurrent_tools: usize,
}

impl Default for OrchestrationSection {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            react_max_iterations: 30,
            parallel_tool_calls: false,
            chunk_size: 10_000,
            finish_tool_name: crate::tools::DEFAULT_FINISH_TOOL.to_string(),
            compact_threshold: 24,
            streaming: true,
            text_protocol: false,
            max_concurrent_tools: 3,
        }
    }
}

/// [tools] 段：文件系统根、工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub filesystem_root: Option<PathBuf>,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            filesystem_root: None,
            tool_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// 工具文件系统根：[tools].filesystem_root > [app].workspace_root > ./workspace
    pub fn filesystem_root(&self) -> PathBuf {
        self.tools
            .filesystem_root
            .clone()
            .or_else(|| self.app.workspace_root.clone())
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
///
/// 解析或类型错误统一转为 AgentError::Config
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| AgentError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.name, "hive");
        assert_eq!(cfg.orchestration.max_iterations, 5);
        assert_eq!(cfg.orchestration.react_max_iterations, 30);
        assert_eq!(cfg.orchestration.chunk_size, 10_000);
        assert_eq!(cfg.orchestration.finish_tool_name, "generate_response");
        assert!(!cfg.orchestration.parallel_tool_calls);
        assert_eq!(cfg.filesystem_root(), PathBuf::from("workspace"));
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(
            &path,
            "[app]\nname = \"research\"\n\n[orchestration]\nmax_iterations = 2\nparallel_tool_calls = true\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.app.name, "research");
        assert_eq!(cfg.orchestration.max_iterations, 2);
        assert!(cfg.orchestration.parallel_tool_calls);
        assert_eq!(cfg.orchestration.chunk_size, 10_000);
    }

    #[test]
    fn test_bad_value_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[orchestration]\nmax_iterations = \"many\"\n").unwrap();
        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert!(err.to_string().starts_with("Config error:"));
    }
}

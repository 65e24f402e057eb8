//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! ReadFileTool / ListDirTool 基于 SafeFs 提供 read_file / list_dir 能力。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::{parameters_schema_for, Tool, ToolOutput, ToolResponse};

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 检查路径是否在沙箱内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let path = path.trim_start_matches("./");
        let full = self.root_dir.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string())) // 如 ../../etc/passwd
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut dir = tokio::fs::read_dir(&base)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{}/", name) } else { name });
        }
        entries.sort();
        Ok(entries)
    }
}

#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
struct PathArgs {
    /// 相对于工作目录的路径
    path: String,
}

fn path_arg<'a>(args: &'a Value, default: &'a str) -> &'a str {
    args.get("path").and_then(|v| v.as_str()).unwrap_or(default)
}

/// 读取文件内容
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read file contents. Args: {\"path\": \"file path relative to workspace\"}"
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<PathArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let path = path_arg(&args, "");
        tracing::info!(path = %path, "read_file tool execute");
        let content = self.fs.read_file(path).await.map_err(|e| e.to_string())?;
        Ok(ToolResponse::text(content).into())
    }
}

/// 列出目录
pub struct ListDirTool {
    fs: SafeFs,
}

impl ListDirTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List directory. Args: {\"path\": \"directory path, default '.'\"}"
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<PathArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, String> {
        let path = path_arg(&args, ".");
        tracing::info!(path = %path, "list_dir tool execute");
        let entries = self.fs.list_dir(path).await.map_err(|e| e.to_string())?;
        Ok(ToolResponse::text(entries.join("\n")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_read_and_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("X"), "hello world").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let read = ReadFileTool::new(dir.path());
        let out = read.execute(json!({"path": "X"})).await.unwrap();
        match out {
            ToolOutput::Once(r) => assert_eq!(r.render(), "hello world"),
            ToolOutput::Stream(_) => panic!("expected single response"),
        }

        let list = ListDirTool::new(dir.path());
        let out = list.execute(json!({})).await.unwrap();
        match out {
            ToolOutput::Once(r) => assert_eq!(r.render(), "X\nsub/"),
            ToolOutput::Stream(_) => panic!("expected single response"),
        }
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(outer.path().join("secret"), "s").unwrap();

        let fs = SafeFs::new(&root);
        let err = fs.resolve("../secret").unwrap_err();
        assert!(matches!(err, AgentError::PathEscape(_)));
    }
}

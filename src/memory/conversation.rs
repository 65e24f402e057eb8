//! 对话记忆：Turn 与 ConversationLog
//!
//! ConversationLog 是一次编排运行的有序、只追加对话日志，同时也是发给模型的上下文。
//! 支持整体清空（隔离式运行）与整体替换（摘要压缩）。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 消息角色（与 LLM API 一致，额外有 Tool 表示工具结果）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 内容块：文本、工具调用、工具结果、图片
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
    ToolResult {
        id: String,
        name: String,
        output: Vec<ContentBlock>,
    },
    Image {
        #[serde(rename = "ref")]
        reference: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// 以纯文本形式渲染（图片渲染为占位符，工具块递归展开）
    pub fn render(&self) -> String {
        match self {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::ToolUse { name, input, .. } => {
                format!("[tool_use {}: {}]", name, Value::Object(input.clone()))
            }
            ContentBlock::ToolResult { output, .. } => render_blocks(output),
            ContentBlock::Image { reference } => format!("[image: {}]", reference),
        }
    }
}

/// 多个内容块拼接为文本，块之间换行
pub fn render_blocks(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(ContentBlock::render)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 对话中的一条记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker_name: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    pub fn new(speaker_name: impl Into<String>, role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            speaker_name: speaker_name.into(),
            role,
            content,
        }
    }

    pub fn user(speaker_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(speaker_name, Role::User, vec![ContentBlock::text(text)])
    }

    pub fn assistant(speaker_name: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self::new(speaker_name, Role::Assistant, content)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new("system", Role::System, vec![ContentBlock::text(text)])
    }

    /// 工具结果记录：携带原调用的 id，便于在并发完成顺序下仍能对应
    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        output: Vec<ContentBlock>,
    ) -> Self {
        let name = name.into();
        Self::new(
            name.clone(),
            Role::Tool,
            vec![ContentBlock::ToolResult {
                id: id.into(),
                name,
                output,
            }],
        )
    }

    /// 所有文本块拼接
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 本条记录中的工具调用块 (id, name)
    pub fn tool_use_ids(&self) -> Vec<(&str, &str)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, .. } => Some((id.as_str(), name.as_str())),
                _ => None,
            })
            .collect()
    }

    /// 若为工具结果记录，返回其关联的调用 id
    pub fn tool_result_id(&self) -> Option<&str> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::ToolResult { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// 对话日志：有序、只追加；snapshot 返回副本供拼 prompt
#[derive(Clone, Debug, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条记录；空内容的记录不入日志
    pub fn append(&mut self, turn: Turn) {
        if turn.is_empty() {
            tracing::debug!(speaker = %turn.speaker_name, "skip empty turn");
            return;
        }
        self.turns.push(turn);
    }

    pub fn append_many(&mut self, turns: impl IntoIterator<Item = Turn>) {
        for turn in turns {
            self.append(turn);
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// 防御性副本：修改返回值不影响日志
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// 整体替换（摘要压缩用）
    pub fn replace(&mut self, turns: Vec<Turn>) {
        self.turns.clear();
        self.append_many(turns);
    }

    /// 可重复调用
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn size(&self) -> usize {
        self.turns.len()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_defensive_copy() {
        let mut log = ConversationLog::new();
        log.append(Turn::user("user", "hi"));
        let mut snap = log.snapshot();
        snap.push(Turn::user("user", "injected"));
        snap[0].content.clear();
        assert_eq!(log.size(), 1);
        assert_eq!(log.turns()[0].text(), "hi");
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut log = ConversationLog::new();
        log.clear();
        log.append_many(vec![Turn::user("user", "a"), Turn::system("b")]);
        assert_eq!(log.size(), 2);
        log.clear();
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_empty_turn_is_not_persisted() {
        let mut log = ConversationLog::new();
        log.append(Turn::assistant("agent", vec![]));
        assert!(log.is_empty());
    }

    #[test]
    fn test_replace_keeps_order() {
        let mut log = ConversationLog::new();
        log.append_many(vec![Turn::user("user", "1"), Turn::user("user", "2")]);
        log.replace(vec![Turn::system("summary"), Turn::user("user", "3")]);
        let texts: Vec<String> = log.turns().iter().map(Turn::text).collect();
        assert_eq!(texts, vec!["summary", "3"]);
    }

    #[test]
    fn test_tool_result_render() {
        let turn = Turn::tool_result(
            "call_1",
            "read_file",
            vec![ContentBlock::text("hello"), ContentBlock::Image { reference: "img.png".into() }],
        );
        assert_eq!(turn.role, Role::Tool);
        assert_eq!(turn.tool_result_id(), Some("call_1"));
        assert_eq!(render_blocks(&turn.content), "hello\n[image: img.png]");
    }

    #[test]
    fn test_content_block_serde_tag() {
        let block = ContentBlock::Image { reference: "a.png".into() };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["ref"], "a.png");
    }
}

//! 各阶段的 system prompt 模板
//!
//! 选择阶段强调「只调用需要的工具」，评估阶段判断「目标是否已满足」，两者分开以便分别注入约束。

use crate::tools::{text_protocol_schema_json, ToolSchema};

fn tool_list(tools: &[ToolSchema]) -> String {
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn text_protocol_section(enabled: bool) -> String {
    if !enabled {
        return String::new();
    }
    format!(
        "\n\n## Tool call format\nTo call a tool, output only one JSON object (or a JSON array of them) matching this schema:\n{}\nTo answer without tools, reply in plain text.",
        text_protocol_schema_json()
    )
}

/// 选择阶段
pub fn selection_prompt(
    agent_name: &str,
    persona: Option<&str>,
    tools: &[ToolSchema],
    text_protocol: bool,
) -> String {
    format!(
        "{}You are {}, an agent that completes the user's task with the tools below.\n\n\
         ## Available tools\n{}\n\n\
         Select the tool calls needed for the task. Do not call tools you don't need. \
         If no action is needed, answer directly without calling any tool.{}",
        persona.map(|p| format!("{}\n\n", p)).unwrap_or_default(),
        agent_name,
        tool_list(tools),
        text_protocol_section(text_protocol)
    )
}

/// 评估阶段
pub fn evaluation_prompt(
    agent_name: &str,
    persona: Option<&str>,
    tools: &[ToolSchema],
    text_protocol: bool,
) -> String {
    format!(
        "{}You are {}. Review the conversation and the tool results so far.\n\n\
         ## Available tools\n{}\n\n\
         Have we satisfied the objective? If yes, do not call any tool: reply with a concise \
         summary of the outcome. If not, call the tools needed for the next step.{}",
        persona.map(|p| format!("{}\n\n", p)).unwrap_or_default(),
        agent_name,
        tool_list(tools),
        text_protocol_section(text_protocol)
    )
}

/// ReAct 推理阶段
pub fn react_prompt(
    agent_name: &str,
    persona: Option<&str>,
    tools: &[ToolSchema],
    finish_tool: Option<&str>,
    text_protocol: bool,
) -> String {
    let finish = finish_tool
        .map(|name| {
            format!(
                "\nWhen the task is complete, call `{}` with your final answer for the user.",
                name
            )
        })
        .unwrap_or_default();
    format!(
        "{}You are {}. Think step by step, then act by calling tools.\n\n\
         ## Available tools\n{}\n{}{}",
        persona.map(|p| format!("{}\n\n", p)).unwrap_or_default(),
        agent_name,
        tool_list(tools),
        finish,
        text_protocol_section(text_protocol)
    )
}

/// 迭代用尽后的兜底总结（不带工具）
pub fn exhausted_summary_prompt(agent_name: &str, max_iterations: usize) -> String {
    format!(
        "You are {}. The task has reached the maximum number of iterations ({}). \
         Without calling any tool, summarize what has been done, what was found, \
         and what remains unfinished.",
        agent_name, max_iterations
    )
}

/// 对话日志压缩
pub fn compaction_prompt() -> &'static str {
    "Summarize the conversation so far into a compact memo. Keep the user's goals, \
     important tool results and decisions. Do not call any tool."
}

/// 小于分块阈值的观察
pub fn observation_turn_text(observation: &str) -> String {
    format!("## Current observation\n{}", observation)
}

/// 分块观察中的一块，附带前面各块的摘要
pub fn observation_chunk_text(index: usize, total: usize, previous: &str, chunk: &str) -> String {
    let previous = if previous.is_empty() {
        "(none)"
    } else {
        previous
    };
    format!(
        "## Current observation (chunk {}/{})\n\
         The observation is too large and is shown in chunks.\n\n\
         ## Previous chunk information\n{}\n\n\
         ## Chunk content\n{}\n\n\
         If this information is sufficient, act by calling tools. Otherwise do not call any tool: \
         reply with the information from this and previous chunks that is relevant to the task.",
        index, total, previous, chunk
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selection_prompt_names_tools() {
        let tools = vec![ToolSchema::new("read_file", "Read a file", json!({}))];
        let prompt = selection_prompt("files", None, &tools, false);
        assert!(prompt.contains("- read_file: Read a file"));
        assert!(prompt.contains("files"));
        assert!(!prompt.contains("Tool call format"));
    }

    #[test]
    fn test_text_protocol_section_included() {
        let prompt = evaluation_prompt("files", Some("Be brief."), &[], true);
        assert!(prompt.starts_with("Be brief."));
        assert!(prompt.contains("Tool call format"));
    }

    #[test]
    fn test_react_prompt_mentions_finish_tool() {
        let prompt = react_prompt("browser", None, &[], Some("generate_response"), false);
        assert!(prompt.contains("`generate_response`"));
    }
}

//! 记忆层：对话记录与对话日志

pub mod conversation;

pub use conversation::{render_blocks, ContentBlock, ConversationLog, Role, Turn};

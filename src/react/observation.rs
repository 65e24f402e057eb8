//! 分块观察
//!
//! 环境快照（如网页文本）超过阈值时按固定字符数切块，逐块喂给模型，
//! 并把「前面各块的信息」摘要带入下一块，直到某块足以行动或块用完。

use async_trait::async_trait;

/// 环境快照提供者：每轮推理前调用一次；None 表示本轮没有观察
#[async_trait]
pub trait Observer: Send + Sync {
    async fn observe(&self) -> Result<Option<String>, String>;
}

/// 按字符数切块（不拆分 UTF-8 字符）；chunk_size 为 0 时不切
pub fn split_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    if chunk_size == 0 || text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        assert_eq!(split_chunks("abc", 10), vec!["abc"]);
        assert_eq!(split_chunks("abc", 0), vec!["abc"]);
    }

    #[test]
    fn test_split_fixed_size() {
        let chunks = split_chunks("abcdefg", 3);
        assert_eq!(chunks, vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_split_multibyte() {
        let chunks = split_chunks("蜂巢蜂巢蜂", 2);
        assert_eq!(chunks, vec!["蜂巢", "蜂巢", "蜂"]);
    }
}

//! 走法表示
//!
//! 所有记谱解析器统一输出 [`ParsedMove`]：
//! - 坐标记谱给出起点和终点格（`is_san = false`）
//! - SAN 记谱只保留原文，起终点留空，由棋局模型在当前局面下解析
//!   （`is_san = true`）

use serde::{Deserialize, Serialize};

/// 解析后的单步走法
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMove {
    /// 原始记谱文本（如 "e2-e4" 或 "Nf3"）
    pub notation: String,
    /// 起点格（坐标记谱时有效，如 "e2"）
    pub from: String,
    /// 终点格（坐标记谱时有效，如 "e4"）
    pub to: String,
    /// 是否为 SAN 记谱
    pub is_san: bool,
}

impl ParsedMove {
    /// 由起终点构造坐标走法
    pub fn coordinate(from: &str, to: &str) -> Self {
        Self {
            notation: format!("{}-{}", from, to),
            from: from.to_string(),
            to: to.to_string(),
            is_san: false,
        }
    }

    /// 由 SAN 文本构造走法
    pub fn san(notation: &str) -> Self {
        Self {
            notation: notation.to_string(),
            from: String::new(),
            to: String::new(),
            is_san: true,
        }
    }
}

/// 判断字符串是否为合法棋盘格（a1 - h8）
pub fn is_square(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 2 && (b'a'..=b'h').contains(&bytes[0]) && (b'1'..=b'8').contains(&bytes[1])
}

//! 坐标记谱解析
//!
//! 文法：可选棋子字母 + 起点格 + 分隔符 + 终点格，分隔符为 `-`、`->`
//! 或一个以上空格，行尾允许 `//` 注释。例：
//!
//! ```text
//! e2-e4
//! Ng1 -> f3   // 出马
//! e7 e5
//! ```

use tracing::debug;

use crate::moves::{is_square, ParsedMove};
use crate::notation::{GameParser, ParserKind};

/// 坐标记谱解析器
#[derive(Debug, Default)]
pub struct SimpleNotationParser;

impl SimpleNotationParser {
    pub fn new() -> Self {
        Self
    }

    /// 解析去掉注释后的一行
    fn parse_line(line: &str) -> Option<(String, String)> {
        let line = match line.find("//") {
            Some(idx) => &line[..idx],
            None => line,
        };
        let mut rest = line.trim();
        if rest.is_empty() {
            return None;
        }

        // 可选的棋子字母前缀
        if let Some(first) = rest.chars().next() {
            if matches!(first, 'K' | 'Q' | 'R' | 'B' | 'N' | 'P') {
                rest = &rest[1..];
            }
        }

        let from = rest.get(..2).filter(|s| is_square(s))?;
        rest = &rest[2..];

        // 分隔符：空格、`-` 或 `->`，允许空格包夹
        let before = rest.len();
        rest = rest.trim_start();
        let mut separated = rest.len() != before;
        if let Some(stripped) = rest.strip_prefix("->").or_else(|| rest.strip_prefix('-')) {
            rest = stripped.trim_start();
            separated = true;
        }
        if !separated {
            return None;
        }

        let to = rest.get(..2).filter(|s| is_square(s))?;

        // 终点格之后只允许空白
        if !rest[2..].trim().is_empty() {
            return None;
        }

        Some((from.to_string(), to.to_string()))
    }
}

impl GameParser for SimpleNotationParser {
    fn parse_move(&self, input: &str) -> Option<ParsedMove> {
        let (from, to) = Self::parse_line(input)?;
        Some(ParsedMove::coordinate(&from, &to))
    }

    fn parse_game(&self, input: &str) -> Option<Vec<ParsedMove>> {
        let mut moves = Vec::new();

        for line in input.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }

            match self.parse_move(trimmed) {
                Some(mv) => moves.push(mv),
                None => {
                    // 解析到中途失败：截断并返回已解析的前缀
                    debug!("坐标记谱解析在此行中止: {}", trimmed);
                    break;
                }
            }
        }

        if moves.is_empty() {
            None
        } else {
            Some(moves)
        }
    }

    fn kind(&self) -> ParserKind {
        ParserKind::Simple
    }
}

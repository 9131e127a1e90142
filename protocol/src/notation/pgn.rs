//! PGN 记谱解析
//!
//! 接受标签段（`[Name "Value"]`*）加走子文本：步数标记（`1.`、`1...`）、
//! SAN 走法（含可选 `+`/`#` 后缀）、花括号注释 `{…}`、嵌套变着 `(…)`
//! （忽略）以及终局标记（`1-0`、`0-1`、`1/2-1/2`、`*`）。
//!
//! 这里只做词法层面的 SAN 识别，歧义消解与合法性交给棋局模型。

use tracing::debug;

use crate::moves::ParsedMove;
use crate::notation::{GameParser, ParserKind};

/// PGN 解析器
#[derive(Debug, Default)]
pub struct PgnParser;

/// 走子文本里的一个词法单元
enum Token {
    San(String),
    /// 步数标记、NAG 等可跳过的单元
    Skip,
    Termination,
    Invalid,
}

impl PgnParser {
    pub fn new() -> Self {
        Self
    }

    /// 检查单个词是否为合法 SAN
    fn is_valid_san(token: &str) -> bool {
        // 允许一个 `+` 或 `#` 后缀
        let t = if token.ends_with('+') || token.ends_with('#') {
            &token[..token.len() - 1]
        } else {
            token
        };

        if t == "O-O" || t == "O-O-O" {
            return true;
        }

        let bytes = t.as_bytes();
        let is_file = |b: u8| (b'a'..=b'h').contains(&b);
        let is_rank = |b: u8| (b'1'..=b'8').contains(&b);
        let is_promotion_piece = |b: u8| matches!(b, b'Q' | b'R' | b'B' | b'N');

        match bytes.first().copied() {
            // 子力走法: [KQRBN][消歧列]?[消歧行]?[x]?<列><行>
            Some(b'K' | b'Q' | b'R' | b'B' | b'N') => {
                let rest = &bytes[1..];
                if rest.len() < 2 {
                    return false;
                }
                let (middle, dest) = rest.split_at(rest.len() - 2);
                if !is_file(dest[0]) || !is_rank(dest[1]) {
                    return false;
                }

                let mut files = 0;
                let mut ranks = 0;
                for (i, &b) in middle.iter().enumerate() {
                    if b == b'x' {
                        // 吃子标记只能紧贴终点格
                        if i != middle.len() - 1 {
                            return false;
                        }
                    } else if is_file(b) {
                        files += 1;
                    } else if is_rank(b) {
                        ranks += 1;
                    } else {
                        return false;
                    }
                }
                files <= 1 && ranks <= 1
            }
            // 兵走法: <列><行> / <列>x<列><行>，可带 =Q 等升变
            Some(b) if is_file(b) => {
                let rest = if bytes.len() >= 2 && bytes[bytes.len() - 2] == b'=' {
                    if !is_promotion_piece(bytes[bytes.len() - 1]) {
                        return false;
                    }
                    &bytes[..bytes.len() - 2]
                } else {
                    bytes
                };

                match rest.len() {
                    2 => is_rank(rest[1]),
                    4 => rest[1] == b'x' && is_file(rest[2]) && is_rank(rest[3]),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// 对走子文本中的一个词分类
    fn classify(token: &str) -> Token {
        if matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*") {
            return Token::Termination;
        }

        // NAG 注解（$1 等）
        if token.starts_with('$') && token[1..].bytes().all(|b| b.is_ascii_digit()) {
            return Token::Skip;
        }

        // 步数标记，可能与走法粘连（"1."、"1..."、"1.e4"）
        if token.bytes().next().is_some_and(|b| b.is_ascii_digit()) {
            let digits = token.bytes().take_while(|b| b.is_ascii_digit()).count();
            let rest = token[digits..].trim_start_matches('.');
            if rest.is_empty() {
                return Token::Skip;
            }
            if Self::is_valid_san(rest) {
                return Token::San(rest.to_string());
            }
            return Token::Invalid;
        }

        if Self::is_valid_san(token) {
            return Token::San(token.to_string());
        }
        Token::Invalid
    }

    /// 剥离标签段、注释和变着，产出走子文本词流
    fn tokenize(input: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut chars = input.char_indices().peekable();

        while let Some((idx, c)) = chars.next() {
            match c {
                c if c.is_whitespace() => {}
                // 标签段
                '[' => {
                    for (_, c) in chars.by_ref() {
                        if c == ']' {
                            break;
                        }
                    }
                }
                // 花括号注释
                '{' => {
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            break;
                        }
                    }
                }
                // 变着，可嵌套
                '(' => {
                    let mut depth = 1;
                    for (_, c) in chars.by_ref() {
                        match c {
                            '(' => depth += 1,
                            ')' => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                }
                ')' => {}
                _ => {
                    let mut end = idx + c.len_utf8();
                    while let Some(&(next_idx, next)) = chars.peek() {
                        if next.is_whitespace() || matches!(next, '{' | '(' | ')' | '[') {
                            break;
                        }
                        end = next_idx + next.len_utf8();
                        chars.next();
                    }
                    tokens.push(input[idx..end].to_string());
                }
            }
        }

        tokens
    }
}

impl GameParser for PgnParser {
    fn parse_move(&self, input: &str) -> Option<ParsedMove> {
        let token = input.trim();
        if Self::is_valid_san(token) {
            Some(ParsedMove::san(token))
        } else {
            None
        }
    }

    fn parse_game(&self, input: &str) -> Option<Vec<ParsedMove>> {
        let mut moves = Vec::new();

        for token in Self::tokenize(input) {
            match Self::classify(&token) {
                Token::San(san) => moves.push(ParsedMove::san(&san)),
                Token::Skip => {}
                Token::Termination => break,
                Token::Invalid => {
                    // 与坐标记谱一致：截断并返回已解析的前缀
                    debug!("PGN 解析在此词中止: {}", token);
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
        ParserKind::Pgn
    }
}

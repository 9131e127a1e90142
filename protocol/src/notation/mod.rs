//! 记谱解析策略
//!
//! 两种策略实现同一个 [`GameParser`] 接口：
//! - [`SimpleNotationParser`]：坐标记谱（`e2-e4`），每行一步
//! - [`PgnParser`]：PGN 棋谱（标签段 + SAN 走子文本）
//!
//! 解析器均为字符串上的纯函数，不做 IO，也不校验走法是否合乎棋规
//! （这是棋局模型的职责）。

mod pgn;
mod simple;

pub use pgn::PgnParser;
pub use simple::SimpleNotationParser;

use crate::moves::ParsedMove;

/// 解析策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Simple,
    Pgn,
}

impl ParserKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParserKind::Simple => "simple",
            ParserKind::Pgn => "pgn",
        }
    }
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParserKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ParserKind::Simple),
            "pgn" => Ok(ParserKind::Pgn),
            other => Err(format!("unknown parser: {} (expected simple or pgn)", other)),
        }
    }
}

/// 记谱解析接口（策略模式）
pub trait GameParser: Send + Sync {
    /// 解析单步走法
    fn parse_move(&self, input: &str) -> Option<ParsedMove>;

    /// 解析整份棋谱，按行棋顺序返回全部走法
    ///
    /// 一个走法都解析不出时返回 `None`；解析到中途失败则在失败处截断，
    /// 返回已解析的前缀。
    fn parse_game(&self, input: &str) -> Option<Vec<ParsedMove>>;

    /// 策略类型
    fn kind(&self) -> ParserKind;
}

/// 按类型构造解析器
pub fn create_parser(kind: ParserKind) -> Box<dyn GameParser> {
    match kind {
        ParserKind::Simple => Box::new(SimpleNotationParser::new()),
        ParserKind::Pgn => Box::new(PgnParser::new()),
    }
}

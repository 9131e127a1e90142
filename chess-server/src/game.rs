//! 棋局模型：规则引擎适配层
//!
//! 把 shakmaty 的走法生成、SAN 解析与 FEN 序列化封装成对局需要的
//! 接口：应用一步走法得到 [`StrikeReport`]，或因不合规则而拒绝。
//! 上层不直接接触规则引擎类型。

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::{CastlingSide, Chess, Color, EnPassantMode, File, Move, Position, Rank, Role,
    Square};
use tracing::debug;

use protocol::{ParsedMove, PlayerColor, StrikeReport};

/// 单局棋的规则状态
pub struct ChessGame {
    position: Chess,
    /// 走子序号时钟：从 1 起，每应用一步加 1
    move_number: u32,
}

impl ChessGame {
    pub fn new() -> Self {
        Self {
            position: Chess::default(),
            move_number: 1,
        }
    }

    /// 回到标准初始局面
    pub fn reset(&mut self) {
        self.position = Chess::default();
        self.move_number = 1;
    }

    /// 应用一步走法；不合规则时返回 `None`，局面保持不变
    pub fn apply(&mut self, mv: &ParsedMove) -> Option<StrikeReport> {
        let m = if mv.is_san {
            self.find_san_move(&mv.notation)?
        } else {
            self.find_coordinate_move(&mv.from, &mv.to)?
        };

        let color = self.position.turn();
        let (case_src, case_dest) = self.squares_of(&m)?;

        let mut report = StrikeReport {
            piece: role_name(m.role()).to_string(),
            color: player_color(color),
            case_src,
            case_dest,
            strike_number: self.move_number,
            is_capture: false,
            captured_piece: String::new(),
            captured_color: String::new(),
            is_castling: false,
            castling_type: String::new(),
            check: false,
            checkmate: false,
            stalemate: false,
        };

        if let Some(captured) = m.capture() {
            report.is_capture = true;
            report.captured_piece = role_name(captured).to_string();
            report.captured_color = player_color(color).opposite().as_str().to_string();
        }

        if let Some(side) = m.castling_side() {
            report.is_castling = true;
            report.castling_type = match side {
                CastlingSide::KingSide => "little",
                CastlingSide::QueenSide => "big",
            }
            .to_string();
        }

        self.position.play_unchecked(&m);
        self.move_number += 1;

        // 终局标志按将死 > 逼和 > 将军的优先级互斥
        if self.position.is_checkmate() {
            report.checkmate = true;
        } else if self.position.is_stalemate() {
            report.stalemate = true;
        } else if self.position.is_check() {
            report.check = true;
        }

        debug!(
            "应用走法: {} {} {} -> {}",
            report.color, report.piece, report.case_src, report.case_dest
        );

        Some(report)
    }

    /// 当前局面的 FEN
    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// 轮到哪方走子
    pub fn side_to_move(&self) -> PlayerColor {
        player_color(self.position.turn())
    }

    /// 渲染 ASCII 棋盘：白方大写、黑方小写，马用 `C`/`c` 表示
    pub fn board_ascii(&self) -> String {
        let mut out = String::new();

        out.push_str(" a b c d e f g h\n");
        out.push_str(" ---------------------------------\n");

        for rank in (0..8u32).rev() {
            out.push(char::from_digit(rank + 1, 10).unwrap_or('?'));
            out.push_str(" |");

            for file in 0..8u32 {
                let square = Square::from_coords(File::new(file), Rank::new(rank));
                let c = match self.position.board().piece_at(square) {
                    Some(piece) => {
                        let base = piece_char(piece.role);
                        if piece.color == Color::White {
                            base.to_ascii_uppercase()
                        } else {
                            base
                        }
                    }
                    None => ' ',
                };
                out.push(' ');
                out.push(c);
                out.push_str(" |");
            }

            out.push_str("\n ---------------------------------\n");
        }

        out.push_str(" a b c d e f g h\n");
        out
    }

    /// 在合法走法里查找起终点匹配的一步
    ///
    /// 易位按王的落点匹配（e1-g1 即短易位）；坐标记谱无法表达升变子力，
    /// 多个候选时取升后。
    fn find_coordinate_move(&self, from: &str, to: &str) -> Option<Move> {
        let from: Square = from.parse().ok()?;
        let to: Square = to.parse().ok()?;
        let color = self.position.turn();

        let mut underpromotion = None;
        for m in self.position.legal_moves() {
            if m.from() != Some(from) {
                continue;
            }
            let dest = match m.castling_side() {
                Some(side) => side.king_to(color),
                None => m.to(),
            };
            if dest != to {
                continue;
            }

            match m.promotion() {
                None | Some(Role::Queen) => return Some(m),
                Some(_) => underpromotion = underpromotion.or(Some(m)),
            }
        }

        if underpromotion.is_none() {
            debug!("走法不在合法走法之列: {}-{}", from, to);
        }
        underpromotion
    }

    /// 按 SAN 在当前局面下解析一步
    ///
    /// `SanPlus` 的解析天然容忍 `+`/`#` 后缀与实际局面不一致。
    fn find_san_move(&self, notation: &str) -> Option<Move> {
        let san: SanPlus = notation.parse().ok()?;
        san.san.to_move(&self.position).ok()
    }

    /// 走法的起终点格（易位取王的起点和落点）
    fn squares_of(&self, m: &Move) -> Option<(String, String)> {
        let from = m.from()?;
        let to = match m.castling_side() {
            Some(side) => side.king_to(self.position.turn()),
            None => m.to(),
        };
        Some((from.to_string(), to.to_string()))
    }
}

impl Default for ChessGame {
    fn default() -> Self {
        Self::new()
    }
}

fn player_color(color: Color) -> PlayerColor {
    match color {
        Color::White => PlayerColor::White,
        Color::Black => PlayerColor::Black,
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Pawn => "pawn",
        Role::Knight => "knight",
        Role::Bishop => "bishop",
        Role::Rook => "rook",
        Role::Queen => "queen",
        Role::King => "king",
    }
}

fn piece_char(role: Role) -> char {
    match role {
        Role::Pawn => 'p',
        // 与通配符区分
        Role::Knight => 'c',
        Role::Bishop => 'b',
        Role::Rook => 'r',
        Role::Queen => 'q',
        Role::King => 'k',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::STARTING_FEN;
    use shakmaty::CastlingMode;

    fn from_fen(fen: &str) -> ChessGame {
        let parsed: Fen = fen.parse().unwrap();
        ChessGame {
            position: parsed.into_position(CastlingMode::Standard).unwrap(),
            move_number: 1,
        }
    }

    fn coord(from: &str, to: &str) -> ParsedMove {
        ParsedMove::coordinate(from, to)
    }

    #[test]
    fn test_initial_fen() {
        let game = ChessGame::new();
        assert_eq!(game.fen(), STARTING_FEN);
        assert_eq!(game.side_to_move(), PlayerColor::White);
    }

    #[test]
    fn test_apply_opening_move() {
        let mut game = ChessGame::new();
        let strike = game.apply(&coord("e2", "e4")).unwrap();

        assert_eq!(strike.piece, "pawn");
        assert_eq!(strike.color, PlayerColor::White);
        assert_eq!(strike.case_src, "e2");
        assert_eq!(strike.case_dest, "e4");
        assert_eq!(strike.strike_number, 1);
        assert!(!strike.is_capture);
        assert!(!strike.check && !strike.checkmate && !strike.stalemate);
        assert_eq!(game.side_to_move(), PlayerColor::Black);
    }

    #[test]
    fn test_illegal_move_rejected() {
        let mut game = ChessGame::new();

        assert!(game.apply(&coord("e2", "e5")).is_none());
        // 局面与序号未变
        assert_eq!(game.fen(), STARTING_FEN);
        assert_eq!(game.apply(&coord("e2", "e4")).unwrap().strike_number, 1);
    }

    #[test]
    fn test_strike_numbers_are_sequential() {
        let mut game = ChessGame::new();

        assert_eq!(game.apply(&coord("e2", "e4")).unwrap().strike_number, 1);
        assert_eq!(game.apply(&coord("e7", "e5")).unwrap().strike_number, 2);
        assert_eq!(game.apply(&coord("g1", "f3")).unwrap().strike_number, 3);

        game.reset();
        assert_eq!(game.apply(&coord("d2", "d4")).unwrap().strike_number, 1);
    }

    #[test]
    fn test_capture_reported() {
        let mut game = ChessGame::new();
        game.apply(&coord("e2", "e4")).unwrap();
        game.apply(&coord("d7", "d5")).unwrap();

        let strike = game.apply(&coord("e4", "d5")).unwrap();
        assert!(strike.is_capture);
        assert_eq!(strike.captured_piece, "pawn");
        assert_eq!(strike.captured_color, "black");
    }

    #[test]
    fn test_kingside_castling_by_coordinates() {
        let mut game = from_fen("r1bqk2r/pppp1ppp/2n2n2/2b1p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 0 1");

        let strike = game.apply(&coord("e1", "g1")).unwrap();
        assert!(strike.is_castling);
        assert_eq!(strike.castling_type, "little");
        assert_eq!(strike.piece, "king");
        assert_eq!(strike.case_src, "e1");
        assert_eq!(strike.case_dest, "g1");
    }

    #[test]
    fn test_san_moves() {
        let mut game = ChessGame::new();

        let strike = game.apply(&ParsedMove::san("e4")).unwrap();
        assert_eq!(strike.case_src, "e2");
        assert_eq!(strike.case_dest, "e4");

        let strike = game.apply(&ParsedMove::san("Nc6")).unwrap();
        assert_eq!(strike.piece, "knight");
        assert_eq!(strike.case_dest, "c6");
    }

    #[test]
    fn test_san_suffix_tolerance() {
        let mut game = ChessGame::new();

        // 实际不是将军，仍接受带 + 的输入
        let strike = game.apply(&ParsedMove::san("e4+")).unwrap();
        assert_eq!(strike.case_dest, "e4");
        assert!(!strike.check);
    }

    #[test]
    fn test_fools_mate_checkmate() {
        let mut game = ChessGame::new();
        game.apply(&coord("f2", "f3")).unwrap();
        game.apply(&coord("e7", "e5")).unwrap();
        game.apply(&coord("g2", "g4")).unwrap();

        let strike = game.apply(&coord("d8", "h4")).unwrap();
        assert!(strike.checkmate);
        assert!(!strike.stalemate);
        assert!(!strike.check);
    }

    #[test]
    fn test_stalemate_flag() {
        let mut game = from_fen("7k/8/7K/8/8/8/6Q1/8 w - - 0 1");

        let strike = game.apply(&coord("g2", "g6")).unwrap();
        assert!(strike.stalemate);
        assert!(!strike.checkmate);
    }

    #[test]
    fn test_board_ascii_layout() {
        let game = ChessGame::new();
        let board = game.board_ascii();

        let lines: Vec<&str> = board.lines().collect();
        assert_eq!(lines[0], " a b c d e f g h");
        // 黑方底线：马渲染为 c
        assert_eq!(lines[2], "8 | r | c | b | q | k | b | c | r |");
        // 白方底线为大写
        assert_eq!(lines[16], "1 | R | C | B | Q | K | B | C | R |");
        assert_eq!(lines.last().unwrap(), &" a b c d e f g h");
    }
}

//! 对局状态机与共享上下文
//!
//! 所有会话操作同一个 [`GameContext`]。命令在当前状态上做 match 分发，
//! 状态迁移是显式赋值而非多态副作用。上下文本身不做任何发送：需要
//! 单播/广播的消息压进 [`Outbox`]，由调用方在释放上下文锁之后统一
//! 刷出，从根上避免上下文锁与会话表锁的嵌套。

use tracing::{debug, info};

use protocol::{
    BoardData, BoardInfo, ParsedMove, PlayerColor, ServerMessage, SessionId,
};

use crate::game::ChessGame;

/// 对局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    /// 尚未凑齐玩家（0 或 1 个槽位被占用）
    WaitingForPlayers,
    /// 双方到齐，等待 start 命令
    ReadyToStart,
    /// 对局进行中
    InProgress,
    /// 终局，只接受重置
    GameOver,
}

impl GameState {
    fn name(self) -> &'static str {
        match self {
            GameState::WaitingForPlayers => "WaitingForPlayers",
            GameState::ReadyToStart => "ReadyToStart",
            GameState::InProgress => "InProgress",
            GameState::GameOver => "GameOver",
        }
    }
}

/// 一次上下文调用产生的待发送消息
#[derive(Debug, Default)]
pub struct Outbox {
    /// 发给指定会话
    pub unicasts: Vec<(SessionId, ServerMessage)>,
    /// (发起方, 消息, 是否含发起方)
    pub broadcasts: Vec<(SessionId, ServerMessage, bool)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unicast(&mut self, target: &str, msg: ServerMessage) {
        self.unicasts.push((target.to_string(), msg));
    }

    pub fn to_all(&mut self, origin: &str, msg: ServerMessage) {
        self.broadcasts.push((origin.to_string(), msg, true));
    }

    pub fn to_others(&mut self, origin: &str, msg: ServerMessage) {
        self.broadcasts.push((origin.to_string(), msg, false));
    }
}

/// 全服唯一的对局上下文
pub struct GameContext {
    state: GameState,
    chess: ChessGame,
    white_player: Option<SessionId>,
    black_player: Option<SessionId>,
}

impl GameContext {
    pub fn new() -> Self {
        info!("对局上下文已初始化");
        Self {
            state: GameState::WaitingForPlayers,
            chess: ChessGame::new(),
            white_player: None,
            black_player: None,
        }
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    /// 按双人模式加入指定颜色
    pub fn handle_join(
        &mut self,
        session_id: &str,
        color: PlayerColor,
        outbox: &mut Outbox,
    ) -> ServerMessage {
        match self.state {
            GameState::WaitingForPlayers => {
                let slot = match color {
                    PlayerColor::White => &mut self.white_player,
                    PlayerColor::Black => &mut self.black_player,
                };
                // 同一会话重复加入是幂等的
                if slot.as_deref().is_some_and(|owner| owner != session_id) {
                    return ServerMessage::error(match color {
                        PlayerColor::White => "White player slot already taken",
                        PlayerColor::Black => "Black player slot already taken",
                    });
                }
                *slot = Some(session_id.to_string());
                info!("玩家 {} 以 {} 加入", session_id, color);

                if self.white_player.is_some() && self.black_player.is_some() {
                    self.transition_to(GameState::ReadyToStart);
                    outbox.to_all(
                        session_id,
                        ServerMessage::GameReady {
                            status: self.status_message(),
                            white_player: self.white_player.clone().unwrap_or_default(),
                            black_player: self.black_player.clone().unwrap_or_default(),
                            single_player: self.white_player == self.black_player,
                        },
                    );
                } else {
                    outbox.to_others(
                        session_id,
                        ServerMessage::PlayerJoined {
                            color,
                            status: self.status_message(),
                        },
                    );
                }

                ServerMessage::JoinSuccess {
                    session_id: session_id.to_string(),
                    color: Some(color),
                    status: self.status_message(),
                    single_player: false,
                }
            }
            GameState::ReadyToStart => ServerMessage::error("Both players already joined"),
            GameState::InProgress => ServerMessage::error("Game already in progress"),
            GameState::GameOver => ServerMessage::error("Game is over. Start a new game"),
        }
    }

    /// 单人模式：同一会话占据双方槽位
    pub fn handle_join_single(&mut self, session_id: &str, outbox: &mut Outbox) -> ServerMessage {
        match self.state {
            GameState::WaitingForPlayers => {
                self.white_player = Some(session_id.to_string());
                self.black_player = Some(session_id.to_string());
                info!("玩家 {} 以单人模式加入", session_id);

                self.transition_to(GameState::ReadyToStart);
                outbox.to_all(
                    session_id,
                    ServerMessage::GameReady {
                        status: self.status_message(),
                        white_player: session_id.to_string(),
                        black_player: session_id.to_string(),
                        single_player: true,
                    },
                );

                ServerMessage::JoinSuccess {
                    session_id: session_id.to_string(),
                    color: None,
                    status: self.status_message(),
                    single_player: true,
                }
            }
            _ => ServerMessage::error("Game already in progress"),
        }
    }

    /// 开始对局，只有已加入的玩家可以触发
    pub fn handle_start(&mut self, session_id: &str, outbox: &mut Outbox) -> ServerMessage {
        match self.state {
            GameState::WaitingForPlayers => {
                ServerMessage::error("Cannot start: waiting for players")
            }
            GameState::ReadyToStart => {
                if !self.is_bound(session_id) {
                    return ServerMessage::error("Only joined players can start the game");
                }

                self.transition_to(GameState::InProgress);
                self.chess.reset();
                let fen = self.chess.fen();
                info!("对局开始");

                outbox.to_others(
                    session_id,
                    ServerMessage::GameStarted {
                        status: self.status_message(),
                        board: BoardInfo { fen: fen.clone() },
                        white_player: self.white_player.clone(),
                        black_player: self.black_player.clone(),
                    },
                );

                ServerMessage::GameStarted {
                    status: self.status_message(),
                    board: BoardInfo { fen },
                    white_player: None,
                    black_player: None,
                }
            }
            GameState::InProgress => ServerMessage::error("Game already started"),
            GameState::GameOver => ServerMessage::error("Game is over. Reset first"),
        }
    }

    /// 走子：请求方与其他会话收到完全相同的 move_result
    pub fn handle_move(
        &mut self,
        session_id: &str,
        mv: &ParsedMove,
        outbox: &mut Outbox,
    ) -> ServerMessage {
        match self.state {
            GameState::WaitingForPlayers => {
                ServerMessage::error("Cannot move: game not started")
            }
            GameState::ReadyToStart => ServerMessage::error("Game not started yet"),
            GameState::GameOver => ServerMessage::error("Game is over"),
            GameState::InProgress => {
                let Some(strike) = self.chess.apply(mv) else {
                    // 规则错误只回给请求方，不广播
                    return ServerMessage::error("Invalid move");
                };

                let terminal = strike.checkmate || strike.stalemate;
                let response = ServerMessage::MoveResult {
                    success: true,
                    strike,
                    board: BoardInfo {
                        fen: self.chess.fen(),
                    },
                };
                outbox.to_others(session_id, response.clone());

                if terminal {
                    self.transition_to(GameState::GameOver);
                    info!("对局结束");
                }

                response
            }
        }
    }

    /// 结束并重置对局
    pub fn handle_end(&mut self, session_id: &str, outbox: &mut Outbox) -> ServerMessage {
        match self.state {
            GameState::WaitingForPlayers => ServerMessage::error("No game to end"),
            _ => self.reset_game(session_id, outbox),
        }
    }

    /// 渲染 ASCII 棋盘，仅对局进行中可用
    pub fn handle_display(&self) -> ServerMessage {
        match self.state {
            GameState::WaitingForPlayers => ServerMessage::error("No game to display"),
            GameState::ReadyToStart => ServerMessage::error("Game not started yet"),
            GameState::GameOver => ServerMessage::error("Game is over. Start a new game"),
            GameState::InProgress => ServerMessage::BoardDisplay {
                status: "ok".to_string(),
                data: BoardData {
                    board: self.chess.board_ascii(),
                },
            },
        }
    }

    /// 会话断开：若占有槽位则整局重置并通知其余会话
    pub fn handle_disconnect(&mut self, session_id: &str, outbox: &mut Outbox) {
        if self.state == GameState::GameOver {
            return;
        }
        if !self.is_bound(session_id) {
            return;
        }

        info!("玩家 {} 断开，重置对局", session_id);

        self.white_player = None;
        self.black_player = None;
        self.chess.reset();
        self.transition_to(GameState::WaitingForPlayers);

        outbox.to_others(
            session_id,
            ServerMessage::GameReset {
                status: "Waiting for players...".to_string(),
                reason: Some("all_players_disconnected".to_string()),
            },
        );
    }

    /// 当前状态的描述文本
    pub fn status_message(&self) -> String {
        match self.state {
            GameState::WaitingForPlayers => {
                match (&self.white_player, &self.black_player) {
                    (Some(_), None) => {
                        "Player 1 (White) joined. Waiting for Player 2 (Black)".to_string()
                    }
                    (None, Some(_)) => {
                        "Player 1 (Black) joined. Waiting for Player 2 (White)".to_string()
                    }
                    _ => "Waiting for players to join".to_string(),
                }
            }
            GameState::ReadyToStart => {
                "Both players joined. Wait for start command to be sent by a player".to_string()
            }
            GameState::InProgress => match self.chess.side_to_move() {
                PlayerColor::White => "Game in progress - White's turn".to_string(),
                PlayerColor::Black => "Game in progress - Black's turn".to_string(),
            },
            GameState::GameOver => "Game over".to_string(),
        }
    }

    fn is_bound(&self, session_id: &str) -> bool {
        self.white_player.as_deref() == Some(session_id)
            || self.black_player.as_deref() == Some(session_id)
    }

    fn reset_game(&mut self, session_id: &str, outbox: &mut Outbox) -> ServerMessage {
        info!("对局重置，发起方: {}", session_id);

        self.white_player = None;
        self.black_player = None;
        self.chess.reset();
        self.transition_to(GameState::WaitingForPlayers);

        let reset = ServerMessage::GameReset {
            status: "Waiting for new players".to_string(),
            reason: None,
        };
        outbox.to_others(session_id, reset.clone());
        reset
    }

    fn transition_to(&mut self, next: GameState) {
        debug!("状态迁移: {} -> {}", self.state.name(), next.name());
        self.state = next;
    }
}

impl Default for GameContext {
    fn default() -> Self {
        Self::new()
    }
}

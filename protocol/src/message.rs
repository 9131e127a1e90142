//! 消息类型定义
//!
//! 线路格式为按行分隔的 JSON 对象：
//! - 客户端消息按 `command` 字段分发
//! - 服务端消息按 `type` 字段分发

use serde::{Deserialize, Serialize};

/// 会话 ID（形如 "session_1"，也作为玩家身份）
pub type SessionId = String;

/// 玩家执子颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    /// 对方颜色
    pub fn opposite(self) -> Self {
        match self {
            PlayerColor::White => PlayerColor::Black,
            PlayerColor::Black => PlayerColor::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerColor::White => "white",
            PlayerColor::Black => "black",
        }
    }
}

impl std::fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlayerColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" => Ok(PlayerColor::White),
            "black" => Ok(PlayerColor::Black),
            other => Err(format!("invalid color: {}", other)),
        }
    }
}

/// 文件上传分块元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub filename: String,
    pub total_size: u64,
    pub chunks_total: u32,
    pub chunk_current: u32,
}

/// 客户端发送给服务端的命令
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    /// 加入对局
    JoinGame {
        #[serde(default)]
        single_player: bool,
        /// 双人模式下必填（"white" / "black"）
        #[serde(default)]
        color: Option<String>,
    },
    /// 开始对局
    StartGame,
    /// 走子
    MakeMove {
        #[serde(rename = "move")]
        mv: String,
    },
    /// 结束并重置对局
    EndGame,
    /// 请求 ASCII 棋盘
    DisplayBoard,
    /// 上传棋谱文件分块
    UploadGame {
        metadata: UploadMetadata,
        data: String,
    },
}

/// 一步合法走子的完整描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeReport {
    /// 棋子名称（"pawn"、"knight" 等）
    pub piece: String,
    /// 走子方
    pub color: PlayerColor,
    /// 起点格
    pub case_src: String,
    /// 终点格
    pub case_dest: String,
    /// 自对局开始的走子序号（从 1 起）
    pub strike_number: u32,
    pub is_capture: bool,
    /// 被吃棋子名称（未吃子时为空串）
    pub captured_piece: String,
    pub captured_color: String,
    pub is_castling: bool,
    /// "little"（短易位）或 "big"（长易位），未易位时为空串
    pub castling_type: String,
    pub check: bool,
    pub checkmate: bool,
    pub stalemate: bool,
}

/// 棋盘信息（FEN）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardInfo {
    pub fen: String,
}

/// ASCII 棋盘载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardData {
    pub board: String,
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    // === 会话 ===
    /// 连接建立后立即下发，携带会话身份
    SessionCreated { session_id: SessionId },

    // === 对局事件 ===
    /// 加入成功（发给请求方）
    JoinSuccess {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<PlayerColor>,
        status: String,
        single_player: bool,
    },
    /// 有玩家加入（广播给其他会话）
    PlayerJoined { color: PlayerColor, status: String },
    /// 双方到齐（广播给所有会话）
    GameReady {
        status: String,
        white_player: SessionId,
        black_player: SessionId,
        single_player: bool,
    },
    /// 对局开始（广播版本携带双方身份）
    GameStarted {
        status: String,
        board: BoardInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        white_player: Option<SessionId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        black_player: Option<SessionId>,
    },
    /// 走子结果（请求方与其他会话收到完全相同的载荷）
    MoveResult {
        success: bool,
        strike: StrikeReport,
        board: BoardInfo,
    },
    /// ASCII 棋盘
    BoardDisplay { status: String, data: BoardData },
    /// 对局已重置
    GameReset {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // === 棋谱上传与回放 ===
    /// 分块接收确认（最后一块不回复，回放结果单独下发）
    UploadProgress {
        filename: String,
        chunk_received: u32,
        chunks_total: u32,
        percent: u32,
    },
    /// 棋谱文件无可用走法
    GameComplete {
        filename: String,
        total_moves: usize,
        error: String,
    },
    /// 回放在终局局面上结束
    GameOver {
        result: String,
        filename: String,
        total_moves: usize,
        requested_moves: usize,
    },

    // === 错误 ===
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parser_used: Option<String>,
    },
}

impl ServerMessage {
    /// 构造纯文本错误消息
    pub fn error(msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: msg.into(),
            details: None,
            parser_used: None,
        }
    }
}

//! 国际象棋对战共享协议库
//!
//! 包含:
//! - 消息类型定义 (ClientCommand, ServerMessage)
//! - 走法表示 (ParsedMove)
//! - 记谱解析策略 (simple 坐标记谱 / PGN)
//! - 传输层抽象 (Listener trait, TCP / Unix socket)
//! - 行帧编解码 (LineReader, LineWriter)

mod constants;
mod error;
mod message;
mod moves;
pub mod notation;
mod transport;

pub use constants::*;
pub use error::{ProtocolError, Result};
pub use message::{
    BoardData, BoardInfo, ClientCommand, PlayerColor, ServerMessage, SessionId, StrikeReport,
    UploadMetadata,
};
pub use moves::{is_square, ParsedMove};
pub use notation::{create_parser, GameParser, ParserKind};
pub use transport::{
    bind, Connection, Endpoint, LineReader, LineWriter, Listener, SessionStream,
    TcpEndpointListener, UnixEndpointListener,
};

//! 国际象棋对战服务端
//!
//! 包含:
//! - 棋局模型适配（规则引擎封装）
//! - 对局状态机与共享上下文
//! - 消息路由与棋谱回放
//! - 会话管理与消息分发

pub mod context;
pub mod controller;
pub mod game;
pub mod server;
pub mod session;

pub use context::{GameContext, GameState, Outbox};
pub use controller::Controller;
pub use game::ChessGame;
pub use server::{Server, SessionRegistry};
pub use session::Session;

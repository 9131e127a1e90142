//! 消息路由
//!
//! 把一行 JSON 变成状态机调用再变回 JSON：解析信封、分发命令、
//! 组装文件上传分块、驱动棋谱回放。一个服务端进程只有一个控制器，
//! 被所有会话的读取任务共享。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use protocol::{
    ClientCommand, GameParser, ParsedMove, ParserKind, PlayerColor, ServerMessage, SessionId,
    UploadMetadata, PLAYBACK_DELAY,
};

use crate::context::{GameContext, Outbox};
use crate::server::SessionRegistry;

/// 一次进行中的文件上传
#[derive(Debug, Default)]
struct FileUpload {
    total_size: u64,
    chunks_total: u32,
    chunks_received: u32,
    data: String,
}

/// 消息路由器
pub struct Controller {
    parser: Box<dyn GameParser>,
    context: Mutex<GameContext>,
    /// 按 (会话, 文件名) 跟踪上传进度
    uploads: Mutex<HashMap<(SessionId, String), FileUpload>>,
    registry: Arc<SessionRegistry>,
}

impl Controller {
    pub fn new(kind: ParserKind, registry: Arc<SessionRegistry>) -> Self {
        info!("控制器已初始化，解析策略: {}", kind);
        Self {
            parser: protocol::create_parser(kind),
            context: Mutex::new(GameContext::new()),
            uploads: Mutex::new(HashMap::new()),
            registry,
        }
    }

    /// 路由一行完整消息，返回需要直接回给请求方的响应
    pub async fn route(&self, line: &str, session_id: &str) -> Option<ServerMessage> {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("JSON 解析失败: {}", e);
                return Some(ServerMessage::Error {
                    error: "Invalid JSON format".to_string(),
                    details: Some(e.to_string()),
                    parser_used: None,
                });
            }
        };

        if value.get("command").is_none() {
            warn!("消息缺少 command 字段");
            return Some(ServerMessage::error("Unknown command"));
        }

        let command: ClientCommand = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(e) if e.to_string().contains("unknown variant") => {
                warn!("未知命令: {}", e);
                return Some(ServerMessage::error("Unknown command"));
            }
            Err(e) => {
                warn!("消息结构不合法: {}", e);
                return Some(ServerMessage::Error {
                    error: "Invalid message structure".to_string(),
                    details: Some(e.to_string()),
                    parser_used: None,
                });
            }
        };

        match command {
            ClientCommand::JoinGame {
                single_player,
                color,
            } => Some(self.handle_join(session_id, single_player, color).await),
            ClientCommand::StartGame => Some(self.handle_start(session_id).await),
            ClientCommand::MakeMove { mv } => Some(self.handle_move(session_id, &mv).await),
            ClientCommand::EndGame => Some(self.handle_end(session_id).await),
            ClientCommand::DisplayBoard => Some(self.handle_display().await),
            ClientCommand::UploadGame { metadata, data } => {
                self.handle_upload_chunk(session_id, metadata, data).await
            }
        }
    }

    /// 会话断开：清理未完成的上传并通知状态机
    pub async fn route_disconnect(&self, session_id: &str) {
        debug!("处理会话断开: {}", session_id);

        self.uploads
            .lock()
            .await
            .retain(|(owner, _), _| owner != session_id);

        let mut outbox = Outbox::new();
        self.context
            .lock()
            .await
            .handle_disconnect(session_id, &mut outbox);
        self.flush(outbox);
    }

    async fn handle_join(
        &self,
        session_id: &str,
        single_player: bool,
        color: Option<String>,
    ) -> ServerMessage {
        info!(
            "会话 {} 请求加入 (single_player: {})",
            session_id, single_player
        );

        let mut outbox = Outbox::new();
        let response = {
            let mut ctx = self.context.lock().await;
            if single_player {
                ctx.handle_join_single(session_id, &mut outbox)
            } else {
                match color.as_deref().map(str::parse::<PlayerColor>) {
                    Some(Ok(color)) => ctx.handle_join(session_id, color, &mut outbox),
                    _ => ServerMessage::error("Invalid color"),
                }
            }
        };
        self.flush(outbox);
        response
    }

    async fn handle_start(&self, session_id: &str) -> ServerMessage {
        info!("会话 {} 请求开始对局", session_id);

        let mut outbox = Outbox::new();
        let response = self.context.lock().await.handle_start(session_id, &mut outbox);
        self.flush(outbox);
        response
    }

    async fn handle_move(&self, session_id: &str, mv: &str) -> ServerMessage {
        info!("会话 {} 走子: {}", session_id, mv);

        let Some(parsed) = self.parser.parse_move(mv) else {
            return ServerMessage::Error {
                error: format!("Couldn't parse move using {}", self.parser.kind()),
                details: None,
                parser_used: Some(self.parser.kind().to_string()),
            };
        };

        self.dispatch_move(session_id, &parsed).await
    }

    async fn handle_end(&self, session_id: &str) -> ServerMessage {
        info!("会话 {} 结束对局", session_id);

        let mut outbox = Outbox::new();
        let response = self.context.lock().await.handle_end(session_id, &mut outbox);
        self.flush(outbox);
        response
    }

    async fn handle_display(&self) -> ServerMessage {
        debug!("渲染棋盘");
        self.context.lock().await.handle_display()
    }

    /// 接收一个上传分块；最后一块不回复，改为驱动回放
    async fn handle_upload_chunk(
        &self,
        session_id: &str,
        metadata: UploadMetadata,
        data: String,
    ) -> Option<ServerMessage> {
        let UploadMetadata {
            filename,
            total_size,
            chunks_total,
            chunk_current,
        } = metadata;

        if chunks_total == 0 || chunk_current == 0 || chunk_current > chunks_total {
            warn!(
                "上传分块越界: {} ({}/{})",
                filename, chunk_current, chunks_total
            );
            return Some(ServerMessage::error("Invalid upload chunk format"));
        }

        let key = (session_id.to_string(), filename.clone());
        let accumulated = {
            let mut uploads = self.uploads.lock().await;

            if chunk_current == 1 {
                info!(
                    "开始接收文件: {} ({} 字节) 会话 {}",
                    filename, total_size, session_id
                );
                uploads.insert(
                    key.clone(),
                    FileUpload {
                        total_size,
                        chunks_total,
                        ..FileUpload::default()
                    },
                );
            }

            let Some(upload) = uploads.get_mut(&key) else {
                return Some(ServerMessage::error("Invalid upload chunk format"));
            };
            upload.data.push_str(&data);
            upload.chunks_received = chunk_current;

            let percent = chunk_current * 100 / upload.chunks_total;
            info!(
                "上传进度 {}: {}% ({}/{})",
                filename, percent, chunk_current, upload.chunks_total
            );

            if chunk_current < chunks_total {
                return Some(ServerMessage::UploadProgress {
                    filename,
                    chunk_received: chunk_current,
                    chunks_total,
                    percent,
                });
            }

            // 最后一块：取出累积内容并清掉表项
            let Some(upload) = uploads.remove(&key) else {
                return Some(ServerMessage::error("Invalid upload chunk format"));
            };
            info!(
                "文件接收完成: {} (声明 {} 字节, 实收 {} 字节)",
                key.1,
                upload.total_size,
                upload.data.len()
            );
            upload.data
        };

        self.play_uploaded_game(session_id, &key.1, &accumulated)
            .await;
        None
    }

    /// 回放一份上传的棋谱：逐步下发结果，出错或终局即停
    async fn play_uploaded_game(&self, session_id: &str, filename: &str, content: &str) {
        let Some(moves) = self.parser.parse_game(content) else {
            warn!("棋谱无可用走法: {}", filename);
            self.registry.unicast(
                session_id,
                &ServerMessage::GameComplete {
                    filename: filename.to_string(),
                    total_moves: 0,
                    error: "No valid moves found. Check file format.".to_string(),
                },
            );
            return;
        };

        info!("回放 {}: 共 {} 步", filename, moves.len());

        let requested_moves = moves.len();
        let mut total_moves = 0usize;
        let mut terminal: Option<&'static str> = None;

        for (index, mv) in moves.iter().enumerate() {
            let response = self.dispatch_move(session_id, mv).await;
            self.registry.unicast(session_id, &response);

            match &response {
                ServerMessage::MoveResult { strike, .. } => {
                    total_moves += 1;
                    if strike.checkmate {
                        terminal = Some("checkmate");
                        break;
                    }
                    if strike.stalemate {
                        terminal = Some("stalemate");
                        break;
                    }
                }
                _ => {
                    warn!("回放在第 {} 步中止: {}", index + 1, mv.notation);
                    break;
                }
            }

            // 给客户端渲染留时间
            tokio::time::sleep(PLAYBACK_DELAY).await;
        }

        if let Some(result) = terminal {
            self.registry.unicast(
                session_id,
                &ServerMessage::GameOver {
                    result: result.to_string(),
                    filename: filename.to_string(),
                    total_moves,
                    requested_moves,
                },
            );
        }
    }

    /// 在上下文锁内执行一步走法并刷出广播
    async fn dispatch_move(&self, session_id: &str, mv: &ParsedMove) -> ServerMessage {
        let mut outbox = Outbox::new();
        let response = self
            .context
            .lock()
            .await
            .handle_move(session_id, mv, &mut outbox);
        self.flush(outbox);
        response
    }

    /// 把一次上下文调用积攒的消息交给会话表发送
    fn flush(&self, outbox: Outbox) {
        for (target, msg) in outbox.unicasts {
            self.registry.unicast(&target, &msg);
        }
        for (origin, msg, to_all) in outbox.broadcasts {
            self.registry.broadcast(&origin, &msg, to_all);
        }
    }
}

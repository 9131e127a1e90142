//! 服务器主逻辑
//!
//! 组合监听器、会话表与控制器：接受循环为每条连接派生会话，清理任务
//! 周期性摘除已关闭的会话。上下文产生的单播/广播经会话表扇出。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use protocol::{Endpoint, Listener, ParserKind, ServerMessage, SessionId, CLEANUP_INTERVAL};

use crate::controller::Controller;
use crate::session::{self, Session};

/// 会话表与清理队列
///
/// 两把锁职责分离：`sessions` 保护会话表与广播遍历，`to_cleanup` 只
/// 保护待摘除队列，读取任务在任意时刻都能无阻塞地报告关闭。
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Session>>,
    to_cleanup: Mutex<Vec<SessionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            to_cleanup: Mutex::new(Vec::new()),
        }
    }

    /// 登记一个新会话
    pub fn register(&self, session: Session) {
        let mut sessions = self.sessions.lock().expect("sessions 锁中毒");
        sessions.insert(session.id().to_string(), session);
    }

    /// 发给指定会话
    pub fn unicast(&self, target: &str, msg: &ServerMessage) {
        let sessions = self.sessions.lock().expect("sessions 锁中毒");
        match sessions.get(target) {
            Some(session) if session.is_active() => session.send(msg),
            _ => warn!("单播失败，会话不存在或已关闭: {}", target),
        }
    }

    /// 广播；`to_all` 为 false 时跳过发起方
    pub fn broadcast(&self, origin: &str, msg: &ServerMessage, to_all: bool) {
        let sessions = self.sessions.lock().expect("sessions 锁中毒");

        let mut count = 0;
        for session in sessions.values() {
            if !to_all && session.id() == origin {
                continue;
            }
            if !session.is_active() {
                continue;
            }
            session.send(msg);
            count += 1;
        }

        debug!("广播送达 {} 个会话", count);
    }

    /// 读取任务报告会话关闭，排队等待清理
    pub fn mark_closed(&self, id: &str) {
        let mut queue = self.to_cleanup.lock().expect("cleanup 锁中毒");
        queue.push(id.to_string());
    }

    /// 摘除所有已报告关闭的会话，返回摘除数量
    pub fn sweep(&self) -> usize {
        let to_cleanup = {
            let mut queue = self.to_cleanup.lock().expect("cleanup 锁中毒");
            std::mem::take(&mut *queue)
        };
        if to_cleanup.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.lock().expect("sessions 锁中毒");
        let mut removed = 0;
        for id in to_cleanup {
            if sessions.remove(&id).is_some() {
                debug!("会话摘除: {}", id);
                removed += 1;
            }
        }
        removed
    }

    /// 关闭全部会话（服务器停机）
    pub fn close_all(&self) {
        let mut sessions = self.sessions.lock().expect("sessions 锁中毒");
        for session in sessions.values() {
            session.close();
        }
        sessions.clear();
    }

    pub fn active_count(&self) -> usize {
        let sessions = self.sessions.lock().expect("sessions 锁中毒");
        sessions.values().filter(|s| s.is_active()).count()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 服务器
pub struct Server {
    listener: Box<dyn Listener>,
    registry: Arc<SessionRegistry>,
    controller: Arc<Controller>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// 绑定端点并装配各组件
    pub async fn bind(endpoint: &Endpoint, parser: ParserKind) -> protocol::Result<Self> {
        let listener = protocol::bind(endpoint).await?;

        let registry = Arc::new(SessionRegistry::new());
        let controller = Arc::new(Controller::new(parser, registry.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        info!("服务器监听于 {}", endpoint);

        Ok(Self {
            listener,
            registry,
            controller,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> Option<String> {
        self.listener.local_addr()
    }

    /// 运行接受循环与清理任务，直到 ctrl-c
    pub async fn run(mut self) -> anyhow::Result<()> {
        let registry = self.registry.clone();
        let mut cleanup_shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            debug!("清理任务启动");
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = registry.sweep();
                        if removed > 0 {
                            debug!("清理 {} 个会话", removed);
                        }
                    }
                    _ = cleanup_shutdown.changed() => break,
                }
            }
            debug!("清理任务退出");
        });

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("收到停机信号");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => {
                        if let Some(peer) = &conn.peer {
                            info!("新连接: {}", peer);
                        } else {
                            info!("新连接 (unix socket)");
                        }
                        session::spawn(
                            conn,
                            self.controller.clone(),
                            self.registry.clone(),
                            self.shutdown_tx.subscribe(),
                        );
                    }
                    Err(e) => {
                        // 瞬时错误（EINTR 一类）不终止接受循环
                        error!("接受连接失败: {}", e);
                    }
                },
            }
        }

        self.stop();
        Ok(())
    }

    /// 停机：通知所有任务退出并关闭全部会话
    fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.registry.close_all();
        info!("服务器已停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{ClientCommand, LineReader, LineWriter};
    use tokio::net::TcpStream;

    struct TestClient {
        reader: LineReader<tokio::net::tcp::OwnedReadHalf>,
        writer: LineWriter<tokio::net::tcp::OwnedWriteHalf>,
    }

    impl TestClient {
        async fn connect(addr: &str) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, write_half) = stream.into_split();
            Self {
                reader: LineReader::new(read_half),
                writer: LineWriter::new(write_half),
            }
        }

        async fn send(&mut self, cmd: &ClientCommand) {
            self.writer.write_message(cmd).await.unwrap();
        }

        async fn recv(&mut self) -> ServerMessage {
            let line = self.reader.read_line().await.unwrap();
            serde_json::from_str(&line).unwrap()
        }
    }

    async fn start_server(parser: ParserKind) -> String {
        let endpoint = Endpoint::Tcp {
            ip: "127.0.0.1".to_string(),
            port: 0,
        };
        let server = Server::bind(&endpoint, parser).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    #[tokio::test]
    async fn test_handshake_assigns_session_id() {
        let addr = start_server(ParserKind::Simple).await;
        let mut client = TestClient::connect(&addr).await;

        match client.recv().await {
            ServerMessage::SessionCreated { session_id } => {
                assert!(session_id.starts_with("session_"));
            }
            other => panic!("Expected session_created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_player_full_flow() {
        let addr = start_server(ParserKind::Simple).await;
        let mut client = TestClient::connect(&addr).await;

        let session_id = match client.recv().await {
            ServerMessage::SessionCreated { session_id } => session_id,
            other => panic!("Expected session_created, got {:?}", other),
        };

        client
            .send(&ClientCommand::JoinGame {
                single_player: true,
                color: None,
            })
            .await;

        // 广播先于直接响应刷出：game_ready 在 join_success 之前到达
        match client.recv().await {
            ServerMessage::GameReady { single_player, white_player, .. } => {
                assert!(single_player);
                assert_eq!(white_player, session_id);
            }
            other => panic!("Expected game_ready, got {:?}", other),
        }
        match client.recv().await {
            ServerMessage::JoinSuccess { single_player, color, .. } => {
                assert!(single_player);
                assert!(color.is_none());
            }
            other => panic!("Expected join_success, got {:?}", other),
        }

        client.send(&ClientCommand::StartGame).await;
        match client.recv().await {
            ServerMessage::GameStarted { board, .. } => {
                assert_eq!(board.fen, protocol::STARTING_FEN);
            }
            other => panic!("Expected game_started, got {:?}", other),
        }

        client
            .send(&ClientCommand::MakeMove {
                mv: "e2-e4".to_string(),
            })
            .await;
        match client.recv().await {
            ServerMessage::MoveResult { strike, .. } => {
                assert_eq!(strike.case_src, "e2");
                assert_eq!(strike.case_dest, "e4");
                assert_eq!(strike.piece, "pawn");
                assert_eq!(strike.strike_number, 1);
                assert!(!strike.is_capture && !strike.check && !strike.checkmate);
            }
            other => panic!("Expected move_result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_two_clients_wrong_state_move() {
        let addr = start_server(ParserKind::Simple).await;

        let mut a = TestClient::connect(&addr).await;
        let _ = a.recv().await; // session_created
        let mut b = TestClient::connect(&addr).await;
        let _ = b.recv().await;

        a.send(&ClientCommand::JoinGame {
            single_player: false,
            color: Some("white".to_string()),
        })
        .await;
        match a.recv().await {
            ServerMessage::JoinSuccess { color, .. } => {
                assert_eq!(color, Some(protocol::PlayerColor::White));
            }
            other => panic!("Expected join_success, got {:?}", other),
        }

        // B 看到 player_joined
        match b.recv().await {
            ServerMessage::PlayerJoined { color, .. } => {
                assert_eq!(color, protocol::PlayerColor::White);
            }
            other => panic!("Expected player_joined, got {:?}", other),
        }

        b.send(&ClientCommand::JoinGame {
            single_player: false,
            color: Some("black".to_string()),
        })
        .await;
        // 双方都收到 game_ready，B 随后是 join_success
        assert!(matches!(a.recv().await, ServerMessage::GameReady { .. }));
        assert!(matches!(b.recv().await, ServerMessage::GameReady { .. }));
        assert!(matches!(b.recv().await, ServerMessage::JoinSuccess { .. }));

        // 未 start 前走子：A 收到错误，B 收不到任何消息
        a.send(&ClientCommand::MakeMove {
            mv: "e2-e4".to_string(),
        })
        .await;
        match a.recv().await {
            ServerMessage::Error { error, .. } => assert_eq!(error, "Game not started yet"),
            other => panic!("Expected error, got {:?}", other),
        }

        // B 的下一条消息应当是 A 开始对局后的广播，而不是错误
        a.send(&ClientCommand::StartGame).await;
        assert!(matches!(a.recv().await, ServerMessage::GameStarted { .. }));
        assert!(matches!(b.recv().await, ServerMessage::GameStarted { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_reset() {
        let addr = start_server(ParserKind::Simple).await;

        let mut a = TestClient::connect(&addr).await;
        let _ = a.recv().await;
        let mut b = TestClient::connect(&addr).await;
        let _ = b.recv().await;

        a.send(&ClientCommand::JoinGame {
            single_player: false,
            color: Some("white".to_string()),
        })
        .await;
        let _ = a.recv().await;
        let _ = b.recv().await; // player_joined

        b.send(&ClientCommand::JoinGame {
            single_player: false,
            color: Some("black".to_string()),
        })
        .await;
        let _ = a.recv().await; // game_ready
        let _ = b.recv().await;
        let _ = b.recv().await; // join_success

        a.send(&ClientCommand::StartGame).await;
        let _ = a.recv().await;
        let _ = b.recv().await; // game_started 广播

        // A 断开，B 收到整局重置
        drop(a);
        match b.recv().await {
            ServerMessage::GameReset { reason, status } => {
                assert_eq!(reason.as_deref(), Some("all_players_disconnected"));
                assert_eq!(status, "Waiting for players...");
            }
            other => panic!("Expected game_reset, got {:?}", other),
        }

        // 新客户端在等待状态下走子
        let mut c = TestClient::connect(&addr).await;
        let _ = c.recv().await;
        c.send(&ClientCommand::MakeMove {
            mv: "e2-e4".to_string(),
        })
        .await;
        match c.recv().await {
            ServerMessage::Error { error, .. } => {
                assert_eq!(error, "Cannot move: game not started");
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_sweep() {
        let registry = SessionRegistry::new();
        let (session, _rx) = Session::for_tests("session_a");
        registry.register(session);

        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.sweep(), 0);

        registry.mark_closed("session_a");
        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.active_count(), 0);

        // 重复清理同一会话无副作用
        registry.mark_closed("session_a");
        assert_eq!(registry.sweep(), 0);
    }

    #[test]
    fn test_broadcast_excludes_origin() {
        let registry = SessionRegistry::new();
        let (sa, mut rx_a) = Session::for_tests("session_a");
        let (sb, mut rx_b) = Session::for_tests("session_b");
        registry.register(sa);
        registry.register(sb);

        registry.broadcast("session_a", &ServerMessage::error("others"), false);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());

        registry.broadcast("session_a", &ServerMessage::error("all"), true);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }
}

//! 会话管理
//!
//! 每条连接对应一个会话：一个读取任务负责行帧组装并逐条交给控制器，
//! 一个写入任务把发送队列里的消息按行写出。其他会话触发的分发通过
//! 发送队列进入，天然与本会话的直接响应串行。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use protocol::{
    Connection, LineReader, LineWriter, ProtocolError, ServerMessage, SessionId,
    OUTBOUND_QUEUE_SIZE,
};

use crate::controller::Controller;
use crate::server::SessionRegistry;

/// 会话 ID 计数器，进程内单调递增
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let n = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    format!("session_{}", n)
}

/// 会话句柄：会话表里保存的部分
///
/// 克隆开销很小，任何线程都可以通过它投递消息；会话关闭后投递变为
/// 静默丢弃。
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    outbound: mpsc::Sender<ServerMessage>,
    active: Arc<AtomicBool>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// 投递一条消息；关闭后或队列满时丢弃
    pub fn send(&self, msg: &ServerMessage) {
        if !self.is_active() {
            return;
        }
        if let Err(e) = self.outbound.try_send(msg.clone()) {
            warn!("会话 {} 发送队列不可用，消息丢弃: {}", self.id, e);
        }
    }

    /// 标记关闭；幂等
    pub fn close(&self) {
        if self.active.swap(false, Ordering::Relaxed) {
            info!("会话关闭: {}", self.id);
        }
    }

    /// 测试用：构造只有接收端的会话句柄
    #[cfg(test)]
    pub(crate) fn for_tests(id: &str) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                id: id.to_string(),
                outbound: tx,
                active: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }
}

/// 接管一条新连接：注册会话、发送握手、启动读写任务
pub fn spawn(
    conn: Connection,
    controller: Arc<Controller>,
    registry: Arc<SessionRegistry>,
    mut shutdown: watch::Receiver<bool>,
) -> SessionId {
    let id = next_session_id();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE_SIZE);

    let session = Session {
        id: id.clone(),
        outbound: tx,
        active: Arc::new(AtomicBool::new(true)),
    };
    info!("会话创建: {}", id);

    let (read_half, write_half) = tokio::io::split(conn.stream);

    // 写入任务：发送队列 -> socket
    let writer_id = id.clone();
    tokio::spawn(async move {
        let mut writer = LineWriter::new(write_half);
        while let Some(msg) = rx.recv().await {
            if let Err(e) = writer.write_message(&msg).await {
                debug!("会话 {} 写失败: {}", writer_id, e);
                break;
            }
        }
    });

    // 握手先入队，再注册进会话表，保证它是本会话收到的第一条消息
    session.send(&ServerMessage::SessionCreated {
        session_id: id.clone(),
    });
    registry.register(session.clone());

    // 读取任务：socket -> 控制器
    let reader_session = session.clone();
    let reader_id = id.clone();
    tokio::spawn(async move {
        let mut reader = LineReader::new(read_half);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("会话 {} 收到停机信号", reader_id);
                    break;
                }
                result = reader.read_line() => match result {
                    Ok(line) => {
                        if let Some(response) = controller.route(&line, &reader_id).await {
                            reader_session.send(&response);
                        }
                    }
                    Err(ProtocolError::ConnectionClosed) => {
                        info!("会话 {} 对端断开", reader_id);
                        break;
                    }
                    Err(e) => {
                        error!("会话 {} 读失败: {}", reader_id, e);
                        break;
                    }
                },
            }
        }

        // 断开清理：先停发送，再通知状态机，最后排队等待摘除
        reader_session.close();
        controller.route_disconnect(&reader_id).await;
        registry.mark_closed(&reader_id);
    });

    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_monotonic() {
        let a = next_session_id();
        let b = next_session_id();

        let num = |s: &str| s.trim_start_matches("session_").parse::<u64>().unwrap();
        assert!(num(&b) > num(&a));
        assert!(a.starts_with("session_"));
    }

    #[tokio::test]
    async fn test_send_after_close_is_noop() {
        let (session, mut rx) = Session::for_tests("session_t");

        session.send(&ServerMessage::error("one"));
        session.close();
        session.close(); // 幂等
        session.send(&ServerMessage::error("two"));

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Error { .. })));
        assert!(rx.try_recv().is_err());
        assert!(!session.is_active());
    }
}

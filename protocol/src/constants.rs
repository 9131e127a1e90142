//! 协议常量定义

use std::time::Duration;

/// 默认监听地址
pub const DEFAULT_IP: &str = "127.0.0.1";

/// 默认服务端口
pub const DEFAULT_PORT: u16 = 2000;

/// 默认 Unix socket 路径
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/chess_server.sock";

/// 单行消息最大长度
pub const MAX_LINE_SIZE: usize = 65536;

/// 读缓冲区大小
pub const READ_BUFFER_SIZE: usize = 1024;

/// 每个会话的发送队列容量
pub const OUTBOUND_QUEUE_SIZE: usize = 32;

/// 清理任务唤醒间隔
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// 棋谱回放时每步之间的间隔（给客户端渲染留时间）
pub const PLAYBACK_DELAY: Duration = Duration::from_millis(50);

/// 标准初始局面 FEN
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

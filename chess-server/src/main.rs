//! 国际象棋服务端入口

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chess_server::Server;
use protocol::{Endpoint, ParserKind, DEFAULT_IP, DEFAULT_PORT, DEFAULT_SOCKET_PATH};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "chess-server", about = "网络对战国际象棋服务端", version)]
struct Args {
    /// 监听 IP（TCP 模式）
    #[arg(short = 'i', long, default_value = DEFAULT_IP)]
    ip: String,

    /// 监听端口（TCP 模式）
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 使用 Unix socket 而非 TCP
    #[arg(long)]
    local: bool,

    /// Unix socket 路径（--local 模式）
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// 记谱解析策略（simple 或 pgn）
    #[arg(long, default_value = "simple")]
    parser: String,

    /// 输出调试日志
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // 初始化日志，RUST_LOG 优先于 --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let parser = match args.parser.parse::<ParserKind>() {
        Ok(kind) => kind,
        Err(e) => {
            error!("无效的解析策略: {}", e);
            return ExitCode::from(2);
        }
    };

    let endpoint = if args.local {
        Endpoint::Unix { path: args.socket }
    } else {
        Endpoint::Tcp {
            ip: args.ip,
            port: args.port,
        }
    };

    // 绑定失败与运行期致命错误使用不同的退出码，便于部署脚本区分
    let server = match Server::bind(&endpoint, parser).await {
        Ok(server) => server,
        Err(e) => {
            error!("绑定 {} 失败: {}", endpoint, e);
            return ExitCode::from(1);
        }
    };

    info!("服务器启动，解析策略: {}", parser);

    match server.run().await {
        Ok(()) => {
            info!("服务器正常退出");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("服务器异常退出: {}", e);
            ExitCode::from(2)
        }
    }
}

//! 传输层抽象
//!
//! 提供 Listener trait 使服务端与具体 socket 类型解耦，支持 TCP（IPv4）
//! 与 Unix domain socket 两种端点。接受的连接统一包成
//! `AsyncRead + AsyncWrite` trait 对象，上层只关心字节流。
//!
//! 帧格式：按 `\n` 分隔的 UTF-8 JSON 行。[`LineReader`] 持有接收缓冲，
//! 跨多次读取拼装完整行；[`LineWriter`] 每条消息写一行并刷新。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, warn};

use crate::constants::{MAX_LINE_SIZE, READ_BUFFER_SIZE};
use crate::error::{ProtocolError, Result};

/// 服务端监听端点
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// TCP over IPv4
    Tcp { ip: String, port: u16 },
    /// Unix domain stream socket
    Unix { path: PathBuf },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp { ip, port } => write!(f, "tcp://{}:{}", ip, port),
            Endpoint::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

/// 连接的字节流抽象
pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SessionStream for T {}

/// 一条已接受的连接
pub struct Connection {
    pub stream: Box<dyn SessionStream>,
    /// 对端地址（Unix socket 没有有意义的对端地址）
    pub peer: Option<String>,
}

/// 监听器抽象 trait（服务端使用）
#[async_trait]
pub trait Listener: Send {
    /// 接受一条连接
    async fn accept(&mut self) -> Result<Connection>;

    /// 获取本地地址
    fn local_addr(&self) -> Option<String>;
}

/// 按端点类型绑定监听器
pub async fn bind(endpoint: &Endpoint) -> Result<Box<dyn Listener>> {
    match endpoint {
        Endpoint::Tcp { ip, port } => {
            let listener = TcpEndpointListener::bind(ip, *port).await?;
            Ok(Box::new(listener))
        }
        Endpoint::Unix { path } => {
            let listener = UnixEndpointListener::bind(path)?;
            Ok(Box::new(listener))
        }
    }
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 监听器
pub struct TcpEndpointListener {
    inner: TcpListener,
}

impl TcpEndpointListener {
    pub async fn bind(ip: &str, port: u16) -> Result<Self> {
        let inner = TcpListener::bind((ip, port)).await?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl Listener for TcpEndpointListener {
    async fn accept(&mut self) -> Result<Connection> {
        let (stream, addr) = self.inner.accept().await?;
        stream.set_nodelay(true)?;

        Ok(Connection {
            stream: Box::new(stream),
            peer: Some(addr.to_string()),
        })
    }

    fn local_addr(&self) -> Option<String> {
        self.inner.local_addr().ok().map(|a| a.to_string())
    }
}

// ============================================================================
// Unix socket 实现
// ============================================================================

/// Unix socket 监听器
///
/// 绑定前清理遗留的 socket 文件，权限设为 0666，drop 时再次清理。
pub struct UnixEndpointListener {
    inner: UnixListener,
    path: PathBuf,
}

impl UnixEndpointListener {
    pub fn bind(path: &Path) -> Result<Self> {
        // 清理上次未正常退出留下的 socket 文件
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let inner = UnixListener::bind(path)?;

        // 所有本地用户可连接
        let perms = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::Permissions::from_mode(0o666)
        };
        std::fs::set_permissions(path, perms)?;

        debug!("Unix socket 监听于 {}", path.display());

        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }
}

#[async_trait]
impl Listener for UnixEndpointListener {
    async fn accept(&mut self) -> Result<Connection> {
        let (stream, _addr) = self.inner.accept().await?;

        Ok(Connection {
            stream: Box::new(stream),
            peer: None,
        })
    }

    fn local_addr(&self) -> Option<String> {
        Some(self.path.display().to_string())
    }
}

impl Drop for UnixEndpointListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("无法清理 socket 文件 {}: {}", self.path.display(), e);
        }
    }
}

// ============================================================================
// 行帧编解码
// ============================================================================

/// 行帧读取器
///
/// 持有接收缓冲：不完整的尾部字节留到下次读取，一次读到多行时逐行产出。
pub struct LineReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_BUFFER_SIZE),
        }
    }

    /// 读取一条完整的行（不含换行符）
    ///
    /// EOF 或读错误返回 `ConnectionClosed`；缓冲中未凑成整行的字节随之丢弃。
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                // 容忍 \r\n 结尾的客户端
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }

            if self.buffer.len() > MAX_LINE_SIZE {
                return Err(ProtocolError::LineTooLong {
                    size: self.buffer.len(),
                    max: MAX_LINE_SIZE,
                });
            }

            let mut chunk = [0u8; READ_BUFFER_SIZE];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

/// 行帧写入器
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 序列化一条消息并按行写出
    pub async fn write_message<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        let mut payload = serde_json::to_vec(msg)?;
        payload.push(b'\n');

        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;

        Ok(())
    }
}

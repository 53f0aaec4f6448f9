//! 本地端口 → 远程 Unix socket 隧道
//!
//! 每个接入的本地连接在同一 SSH 会话上打开一条 direct-streamlocal 通道，
//! 双向转发直到任一端关闭。
//!
//! 并发连接数不设上限：只面向单个操作者的本地会话，不是多租户代理。

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::services::ssh::client::SshSession;

/// 打开到远程 Unix socket 的连接
#[async_trait]
pub trait SocketDialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn dial(&self, socket_path: &str) -> Result<Self::Stream>;
}

/// 装箱的双向字节流
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

#[async_trait]
impl SocketDialer for SshSession {
    type Stream = Box<dyn ByteStream>;

    async fn dial(&self, socket_path: &str) -> Result<Self::Stream> {
        let channel = self.open_socket_channel(socket_path).await?;
        Ok(Box::new(channel.into_stream()))
    }
}

/// 绑定本地监听端口
pub async fn bind_local(port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!(addr = %listener.local_addr()?, "Tunnel listening");
    Ok(listener)
}

/// 接受本地连接并转发，直到 `cancel` 被触发
///
/// 取消只在 accept 之前检查；已建立的连接随之关闭
pub async fn run_tunnel<D: SocketDialer>(
    listener: TcpListener,
    dialer: Arc<D>,
    socket_path: &str,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Tunnel cancelled");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Tunnel accept failed");
                continue;
            }
        };

        debug!(peer = %peer, "Tunnel connection accepted");
        tokio::spawn(relay(
            stream,
            peer,
            dialer.clone(),
            socket_path.to_string(),
            cancel.child_token(),
        ));
    }
    Ok(())
}

async fn relay<D: SocketDialer>(
    mut local: TcpStream,
    peer: SocketAddr,
    dialer: Arc<D>,
    socket_path: String,
    cancel: CancellationToken,
) {
    let mut remote = match dialer.dial(&socket_path).await {
        Ok(remote) => remote,
        Err(e) => {
            warn!(peer = %peer, socket = %socket_path, error = %e, "Failed to open remote socket");
            return;
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(peer = %peer, "Relay cancelled");
        }
        result = tokio::io::copy_bidirectional(&mut local, &mut remote) => match result {
            Ok((up, down)) => debug!(peer = %peer, up, down, "Relay closed"),
            Err(e) => debug!(peer = %peer, error = %e, "Relay ended with error"),
        },
    }
}

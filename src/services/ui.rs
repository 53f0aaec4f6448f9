//! tunnel-ui：通过隧道在本地运行容器日志查看器
//!
//! 本地回环端口经 SSH 转发到远程 Docker socket，本地 dozzle 容器以主机网络运行并以 TCP 方式连接该端口。
//! Ctrl-C 或 SIGTERM 后取消隧道并删除查看器容器。

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::env::constants::{DOCKER_SOCKET, LOG_VIEWER_IMAGE, LOG_VIEWER_NAME, LOG_VIEWER_PORT};
use crate::error::Result;
use crate::infra::{shutdown_signal, CommandRunner};
use crate::services::ssh::client::SshSession;
use crate::services::tunnel;

/// 启动查看器的 `docker` 参数
///
/// 隧道只监听本机回环地址，查看器因此使用主机网络，直接连接 `127.0.0.1` 上的隧道端口，
/// 并在主机网络上监听 `LOG_VIEWER_PORT`
pub fn viewer_args(tunnel_port: u16) -> Vec<String> {
    vec![
        "run".to_string(),
        "-d".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        LOG_VIEWER_NAME.to_string(),
        "--network".to_string(),
        "host".to_string(),
        "-e".to_string(),
        format!("DOCKER_HOST=tcp://127.0.0.1:{}", tunnel_port),
        "-e".to_string(),
        format!("DOZZLE_ADDR=127.0.0.1:{}", LOG_VIEWER_PORT),
        LOG_VIEWER_IMAGE.to_string(),
    ]
}

async fn docker(args: &[String]) -> Result<()> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    CommandRunner::run_streaming("docker", &args, Path::new(".")).await
}

/// 运行隧道与查看器，直到 Ctrl-C 或 SIGTERM
pub async fn run_log_viewer(session: &SshSession, tunnel_port: u16) -> Result<()> {
    let listener = tunnel::bind_local(tunnel_port).await?;
    let cancel = CancellationToken::new();
    let relay = tokio::spawn(tunnel::run_tunnel(
        listener,
        Arc::new(session.clone()),
        DOCKER_SOCKET,
        cancel.clone(),
    ));

    if let Err(e) = docker(&viewer_args(tunnel_port)).await {
        cancel.cancel();
        let _ = relay.await;
        return Err(e);
    }

    println!(
        "log viewer running at http://localhost:{}, press Ctrl-C to stop",
        LOG_VIEWER_PORT
    );
    shutdown_signal().await;

    cancel.cancel();
    if let Err(e) = docker(&["rm".to_string(), "-f".to_string(), LOG_VIEWER_NAME.to_string()]).await {
        warn!(container = LOG_VIEWER_NAME, error = %e, "Failed to remove log viewer");
    }
    match relay.await {
        Ok(result) => result?,
        Err(e) => warn!(error = %e, "Tunnel task ended abnormally"),
    }

    info!("Log viewer stopped");
    Ok(())
}

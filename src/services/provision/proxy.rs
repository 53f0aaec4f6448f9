//! 反向代理 (Traefik) 安装与配置合并
//!
//! - 代理已运行且部署声明了超时：读取主机上的配置，单调合并；只有文档改变时才写回并重启
//! - 代理未运行：创建网络、写入新配置与证书存储文件、删除残留容器后启动代理

use tracing::{info, warn};

use crate::config::env::constants::{
    DOCKER_SOCKET, PROXY_ACME_PATH, PROXY_CONFIG_DIR, PROXY_CONFIG_PATH, PROXY_IMAGE, PROXY_NAME,
};
use crate::domain::deploy::WebAdvancedConfig;
use crate::domain::proxy::ProxyDocument;
use crate::error::{HostctlError, Result};
use crate::infra::RemoteCommand;
use crate::services::ssh::RemoteShell;

/// 合并结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// 代理已在运行，配置无需改变
    Unchanged,
    /// 配置已合并写回并重启代理
    Reconfigured,
    /// 新部署了代理
    Installed,
}

fn running_probe() -> RemoteCommand {
    RemoteCommand::new("docker")
        .args(["ps", "--filter"])
        .arg(format!("name=^/{}$", PROXY_NAME))
        .args(["--filter", "status=running", "--format", "{{.Names}}"])
}

/// 代理容器启动命令
pub fn launch_command() -> RemoteCommand {
    RemoteCommand::new("docker")
        .args(["run", "-d", "--restart", "always", "--name", PROXY_NAME])
        .args(["--network", PROXY_NAME])
        .args(["-p", "80:80", "-p", "443:443"])
        .arg("-v")
        .arg(format!("{}:{}", DOCKER_SOCKET, DOCKER_SOCKET))
        .arg("-v")
        .arg(format!("{}:/etc/traefik/traefik.yml", PROXY_CONFIG_PATH))
        .arg("-v")
        .arg(format!("{}:/acme.json", PROXY_ACME_PATH))
        .arg(PROXY_IMAGE)
}

/// 确保反向代理已部署（仅 Web 服务调用）
pub async fn ensure_setup(shell: &dyn RemoteShell, email: &str, web: &WebAdvancedConfig) -> Result<ProxyOutcome> {
    let running = shell.run_silent(&running_probe()).await?;
    if running.stdout.lines().any(|l| l.trim() == PROXY_NAME) {
        if !web.has_timeouts() {
            return Ok(ProxyOutcome::Unchanged);
        }
        return merge_existing(shell, web).await;
    }

    install_fresh(shell, email, web).await?;
    Ok(ProxyOutcome::Installed)
}

async fn merge_existing(shell: &dyn RemoteShell, web: &WebAdvancedConfig) -> Result<ProxyOutcome> {
    let current = shell
        .run_silent(&RemoteCommand::new("cat").arg(PROXY_CONFIG_PATH))
        .await?;
    let mut doc = ProxyDocument::parse(&current.stdout)?;

    if !doc.merge_timeouts(web) {
        info!("Proxy timeouts already satisfy this deployment, no restart needed");
        return Ok(ProxyOutcome::Unchanged);
    }

    println!("updating proxy timeouts");
    shell
        .write_file(PROXY_CONFIG_PATH, doc.serialize()?.as_bytes())
        .await?;

    // 配置已写入；重启失败时不回滚配置文件
    shell
        .run(&RemoteCommand::new("docker").args(["restart", PROXY_NAME]))
        .await
        .map_err(|e| {
            warn!(path = PROXY_CONFIG_PATH, error = %e, "Proxy restart failed after config rewrite");
            HostctlError::ProxyRestartAfterRewrite {
                path: PROXY_CONFIG_PATH.to_string(),
                source: Box::new(e),
            }
        })?;

    info!("Proxy reconfigured");
    Ok(ProxyOutcome::Reconfigured)
}

async fn install_fresh(shell: &dyn RemoteShell, email: &str, web: &WebAdvancedConfig) -> Result<()> {
    println!("setting up reverse proxy");

    let network_exists = shell
        .probe(&RemoteCommand::new("docker").args(["network", "inspect", PROXY_NAME]))
        .await?;
    if !network_exists {
        shell
            .run(&RemoteCommand::new("docker").args(["network", "create", PROXY_NAME]))
            .await?;
    }

    shell
        .run(&RemoteCommand::new("mkdir").args(["-p", PROXY_CONFIG_DIR]))
        .await?;

    let doc = ProxyDocument::fresh(email, web);
    shell
        .write_file(PROXY_CONFIG_PATH, doc.serialize()?.as_bytes())
        .await?;

    shell.run(&RemoteCommand::new("touch").arg(PROXY_ACME_PATH)).await?;
    shell
        .run(&RemoteCommand::new("chmod").args(["600", PROXY_ACME_PATH]))
        .await?;

    shell
        .run(&RemoteCommand::new("docker").args(["rm", "--force", PROXY_NAME]).tolerate_failure())
        .await?;
    shell.run(&launch_command()).await?;

    info!(image = PROXY_IMAGE, "Proxy installed");
    Ok(())
}

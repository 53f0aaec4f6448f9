//! 环境变量覆盖与 SSH 私钥发现

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HostctlError, Result};

/// 按顺序尝试的默认私钥文件名
pub const DEFAULT_KEY_NAMES: [&str; 3] = ["id_ed25519", "id_rsa", "id_ecdsa"];

/// 环境变量覆盖项（优先级高于项目文件）
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// HOSTCTL_SSH_KEY
    pub ssh_key: Option<String>,
    /// HOSTCTL_SSH_USER
    pub ssh_user: Option<String>,
    /// HOSTCTL_SSH_PORT
    pub ssh_port: Option<u16>,
    /// HOSTCTL_SERVER
    pub server: Option<String>,
}

impl EnvOverrides {
    /// 从环境变量加载
    pub fn from_env() -> Self {
        let ssh_key = non_empty("HOSTCTL_SSH_KEY");
        let ssh_user = non_empty("HOSTCTL_SSH_USER");
        let ssh_port = env::var("HOSTCTL_SSH_PORT")
            .ok()
            .and_then(|v| v.parse().ok());
        let server = non_empty("HOSTCTL_SERVER");

        Self {
            ssh_key,
            ssh_user,
            ssh_port,
            server,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// 展开开头的 `~/`
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// 在 `~/.ssh` 下按顺序查找默认私钥
pub fn discover_ssh_key() -> Result<PathBuf> {
    let ssh_dir = dirs::home_dir()
        .map(|h| h.join(".ssh"))
        .ok_or_else(|| HostctlError::NoSshKey("home directory not found".to_string()))?;
    discover_ssh_key_in(&ssh_dir)
}

/// 在指定目录中按顺序查找默认私钥
pub fn discover_ssh_key_in(ssh_dir: &Path) -> Result<PathBuf> {
    for name in DEFAULT_KEY_NAMES {
        let candidate = ssh_dir.join(name);
        if candidate.is_file() {
            debug!(key = %candidate.display(), "Using discovered ssh key");
            return Ok(candidate);
        }
    }

    let tried = DEFAULT_KEY_NAMES
        .iter()
        .map(|n| ssh_dir.join(n).display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(HostctlError::NoSshKey(tried))
}

/// 常量
pub mod constants {
    use std::time::Duration;

    /// 反向代理容器与网络名称
    pub const PROXY_NAME: &str = "traefik";

    /// 反向代理镜像
    pub const PROXY_IMAGE: &str = "traefik:v3.1";

    /// 反向代理配置目录
    pub const PROXY_CONFIG_DIR: &str = "/etc/traefik";

    /// 反向代理静态配置文件
    pub const PROXY_CONFIG_PATH: &str = "/etc/traefik/traefik.yml";

    /// ACME 证书存储文件
    pub const PROXY_ACME_PATH: &str = "/etc/traefik/acme.json";

    /// 应用容器内部监听端口
    pub const APP_INTERNAL_PORT: u16 = 80;

    /// 远程 Docker socket
    pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

    /// 仓库认证文件在主机上的位置
    pub const DOCKER_AUTH_DIR: &str = "/root/.docker";
    pub const DOCKER_AUTH_PATH: &str = "/root/.docker/config.json";

    /// doctl 版本
    pub const DOCTL_VERSION: &str = "1.95.0";

    /// 日志查看器镜像
    pub const LOG_VIEWER_IMAGE: &str = "amir20/dozzle";
    pub const LOG_VIEWER_NAME: &str = "hostctl-dozzle";
    /// 日志查看器本地访问端口
    pub const LOG_VIEWER_PORT: u16 = 8888;

    /// tunnel-ui 默认本地端口
    pub const DEFAULT_TUNNEL_PORT: u16 = 2375;

    /// `logs` 命令默认回放的行数
    pub const LOG_TAIL_LINES: u32 = 30;

    /// 本地日志下载目录
    pub const LOCAL_LOG_DIR: &str = "hostctl-logs";

    /// monitor 两次采样之间的间隔
    pub const MONITOR_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

    /// `logs` 中断后等待远端关闭通道的上限
    pub const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

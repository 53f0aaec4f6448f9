//! SSH 目标主机领域模型

use std::fmt;
use std::path::PathBuf;

/// 默认登录用户
pub const DEFAULT_SSH_USER: &str = "root";

/// 默认 SSH 端口
pub const DEFAULT_SSH_PORT: u16 = 22;

/// 一次调用所操作的远程主机（解析后不再修改）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteTarget {
    /// 主机地址
    pub host: String,
    pub port: u16,
    /// 登录用户
    pub user: String,
    /// 私钥文件
    pub key_path: PathBuf,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            key_path: key_path.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// 非 root 用户需要 sudo 提权
    pub fn needs_sudo(&self) -> bool {
        self.user != DEFAULT_SSH_USER
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

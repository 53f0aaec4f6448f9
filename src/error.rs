//! 统一错误处理
//!
//! `HostctlError` 覆盖所有远程操作的失败类型，`ErrorReport` 负责在终端输出带边框的错误诊断

use std::fmt;

use thiserror::Error;

/// 远程编排错误
#[derive(Debug, Error)]
pub enum HostctlError {
    /// 无法识别远程主机的操作系统
    #[error("unable to determine host os (checked /etc/os-release and marker files)")]
    UnknownHostOs,

    /// 不支持的镜像仓库
    #[error("unsupported registry: {0}")]
    UnsupportedRegistry(String),

    /// 仓库 URL 中找不到区域信息
    #[error("cannot extract region from registry url: {0}")]
    MalformedRegistryUrl(String),

    /// 远程命令以非零状态退出
    #[error("command `{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i64,
        stderr: String,
    },

    /// 远程命令输出无法解析
    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    /// 卷挂载格式错误 (缺少 `host:container` 分隔符)
    #[error("malformed volume mount `{0}`, expected host:container")]
    MalformedVolume(String),

    /// 声明的仓库认证文件不存在
    #[error("no docker registry auth file found at: {0}")]
    AuthFileMissing(String),

    /// 找不到可用的 SSH 私钥
    #[error("no ssh key found (tried {0})")]
    NoSshKey(String),

    /// SSH 公钥认证被拒绝
    #[error("ssh authentication rejected for {user}@{host}")]
    AuthRejected { user: String, host: String },

    #[error("could not enable docker on server: {0}")]
    RuntimeEnable(Box<HostctlError>),

    #[error("could not start docker on server: {0}")]
    RuntimeRestart(Box<HostctlError>),

    /// 旧容器已删除但新容器启动失败，主机上该应用当前没有运行中的容器
    #[error(
        "container `{container}` was removed but its replacement failed to start; \
         the host has no running container for this application: {source}"
    )]
    LaunchAfterTeardown {
        container: String,
        #[source]
        source: Box<HostctlError>,
    },

    /// 反向代理配置文档解析/序列化失败
    #[error("reverse proxy config: {0}")]
    ProxyDocument(#[from] serde_yaml::Error),

    /// 配置已写入但代理重启失败，配置文件不会回滚
    #[error("proxy config at {path} was rewritten but restarting the proxy failed: {source}")]
    ProxyRestartAfterRewrite {
        path: String,
        #[source]
        source: Box<HostctlError>,
    },

    /// `.dockerignore` 中的模式无法编译
    #[error("invalid ignore pattern `{pattern}`: {source}")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// 项目配置错误
    #[error("config: {0}")]
    Config(String),

    #[error("ssh: {0}")]
    Ssh(#[from] russh::Error),

    #[error("ssh key: {0}")]
    SshKey(#[from] russh_keys::Error),

    #[error("sftp: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl HostctlError {
    /// 创建命令失败错误
    pub fn command_failed(command: impl Into<String>, status: i64, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            status,
            stderr: stderr.into().trim().to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// 便捷类型别名
pub type Result<T, E = HostctlError> = std::result::Result<T, E>;

/// 终端错误报告
///
/// 将正在执行的动作与底层原因分开显示
#[derive(Debug)]
pub struct ErrorReport {
    pub action: String,
    pub reason: String,
}

impl ErrorReport {
    pub fn new(action: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            action: action.into(),
            reason: reason.to_string(),
        }
    }

    /// 从 anyhow 错误链构建：最外层 context 为动作，其余为原因
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let mut chain = err.chain();
        let action = chain.next().map(ToString::to_string).unwrap_or_default();
        let reason = chain.map(ToString::to_string).collect::<Vec<_>>().join("\n");
        if reason.is_empty() {
            Self::new("running command", action)
        } else {
            Self::new(action, reason)
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .action
            .len()
            .max(self.reason.lines().map(str::len).max().unwrap_or(0))
            .clamp(24, 96)
            + 10;
        let rule = "-".repeat(width);
        writeln!(f)?;
        writeln!(f, "+{}+", rule)?;
        writeln!(f, "| error")?;
        writeln!(f, "+{}+", rule)?;
        writeln!(f, "| action: {}", self.action)?;
        for (i, line) in self.reason.lines().enumerate() {
            if i == 0 {
                writeln!(f, "| reason: {}", line)?;
            } else {
                writeln!(f, "|         {}", line)?;
            }
        }
        writeln!(f, "+{}+", rule)?;
        write!(
            f,
            "if this error is not clear, check the command trace above to see which step failed"
        )
    }
}

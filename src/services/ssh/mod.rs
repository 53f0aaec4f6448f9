//! 远程命令通道
//!
//! `RemoteShell` 是编排逻辑与 SSH 传输之间的接缝：
//! 生产环境由 [`client::SshSession`] 实现，测试使用记录型替身。

pub mod client;
#[cfg(test)]
pub mod mock;

use std::path::Path;

use async_trait::async_trait;

use crate::domain::deploy::app_env_file;
use crate::error::{HostctlError, Result};
use crate::infra::{shell_quote, RemoteCommand};

pub use client::SshSession;

/// 是否回显命令与输出
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Echo {
    /// 回显命令及其输出
    #[default]
    Verbose,
    /// 仅用于决策的探测命令，不回显
    Silent,
}

/// 执行选项
#[derive(Clone, Debug, Default)]
pub struct ExecOptions {
    pub echo: Echo,
    /// 应用上下文：存在时先加载 `/etc/<app>/<app>.env`
    pub app: Option<String>,
}

impl ExecOptions {
    pub fn verbose() -> Self {
        Self::default()
    }

    pub fn silent() -> Self {
        Self {
            echo: Echo::Silent,
            app: None,
        }
    }

    pub fn in_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }
}

/// 远程命令结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// 非零退出码转换为 `CommandFailed`
    pub fn into_result(self, command: &RemoteCommand) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(HostctlError::command_failed(command.render(), self.status, self.stderr))
        }
    }
}

/// 渲染最终发送到主机的脚本
///
/// 带应用上下文时前置环境文件加载守卫（文件不存在时跳过）；
/// 非 root 用户时整体包进 `sudo sh -c`
pub fn render_script(cmd: &RemoteCommand, opts: &ExecOptions, sudo: bool) -> String {
    let mut script = String::new();
    if let Some(ref app) = opts.app {
        let env_file = shell_quote(&app_env_file(app));
        script.push_str(&format!(
            "if [ -f {f} ]; then set -a; . {f}; set +a; fi; ",
            f = env_file
        ));
    }
    script.push_str(&cmd.render());

    if sudo {
        format!("sudo sh -c {}", shell_quote(&script))
    } else {
        script
    }
}

/// 远程 shell
///
/// 单个会话串行复用；通道从不自动重试，重试策略由调用方决定
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// 执行命令并返回原始结果（非零退出码不视为错误）
    async fn exec(&self, cmd: &RemoteCommand, opts: &ExecOptions) -> Result<CommandOutput>;

    /// 上传本地文件（流式）
    async fn copy_to(&self, local: &Path, remote: &str) -> Result<()>;

    /// 下载远程文件（流式）
    async fn copy_from(&self, remote: &str, local: &Path) -> Result<()>;

    /// 将内存中的内容写入远程文件
    async fn write_file(&self, remote: &str, contents: &[u8]) -> Result<()>;

    /// 回显执行，非零退出码返回错误
    async fn run(&self, cmd: &RemoteCommand) -> Result<CommandOutput> {
        self.exec(cmd, &ExecOptions::verbose()).await?.into_result(cmd)
    }

    /// 在应用环境中回显执行
    async fn run_in_app(&self, cmd: &RemoteCommand, app: &str) -> Result<CommandOutput> {
        self.exec(cmd, &ExecOptions::verbose().in_app(app)).await?.into_result(cmd)
    }

    /// 静默执行，非零退出码返回错误
    async fn run_silent(&self, cmd: &RemoteCommand) -> Result<CommandOutput> {
        self.exec(cmd, &ExecOptions::silent()).await?.into_result(cmd)
    }

    /// 静默探测：只关心退出码，传输错误仍然向上传递
    async fn probe(&self, cmd: &RemoteCommand) -> Result<bool> {
        Ok(self.exec(cmd, &ExecOptions::silent()).await?.success())
    }
}

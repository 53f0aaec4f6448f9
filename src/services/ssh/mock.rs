//! 记录型 `RemoteShell` 替身
//!
//! 按子串匹配预设响应，记录每条渲染后的命令与上传内容，用于验证命令构造与执行顺序。

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::infra::RemoteCommand;

use super::{render_script, CommandOutput, Echo, ExecOptions, RemoteShell};

/// 一次上传
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub remote: String,
    /// `copy_to` 的本地路径，`write_file` 时为 `None`
    pub local: Option<String>,
    pub contents: Option<String>,
}

#[derive(Default)]
pub struct RecordingShell {
    sudo: bool,
    responses: Mutex<Vec<(String, CommandOutput)>>,
    commands: Mutex<Vec<(String, Echo)>>,
    uploads: Mutex<Vec<Upload>>,
    downloads: Mutex<Vec<(String, String)>>,
}

impl RecordingShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以非 root 用户身份渲染命令
    pub fn with_sudo(mut self) -> Self {
        self.sudo = true;
        self
    }

    /// 包含 `pattern` 的命令返回给定 stdout，退出码 0
    pub fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.respond_with(
            pattern,
            CommandOutput {
                stdout: stdout.to_string(),
                ..Default::default()
            },
        )
    }

    /// 包含 `pattern` 的命令以给定退出码失败
    pub fn fail(self, pattern: &str, status: i64, stderr: &str) -> Self {
        self.respond_with(
            pattern,
            CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                status,
            },
        )
    }

    pub fn respond_with(self, pattern: &str, output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), output));
        self
    }

    /// 已执行的命令（渲染后）
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    /// 第一条包含 `pattern` 的命令的回显方式
    pub fn echo_of(&self, pattern: &str) -> Option<Echo> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c.contains(pattern))
            .map(|(_, echo)| *echo)
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> Vec<(String, String)> {
        self.downloads.lock().unwrap().clone()
    }

    /// 第一条包含 `pattern` 的命令的位置
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }
}

#[async_trait]
impl RemoteShell for RecordingShell {
    async fn exec(&self, cmd: &RemoteCommand, opts: &ExecOptions) -> Result<CommandOutput> {
        let script = render_script(cmd, opts, self.sudo);
        self.commands.lock().unwrap().push((script.clone(), opts.echo));

        let output = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| script.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }

    async fn copy_to(&self, local: &Path, remote: &str) -> Result<()> {
        self.uploads.lock().unwrap().push(Upload {
            remote: remote.to_string(),
            local: Some(local.display().to_string()),
            contents: None,
        });
        Ok(())
    }

    async fn copy_from(&self, remote: &str, local: &Path) -> Result<()> {
        tokio::fs::write(local, format!("contents of {}", remote)).await?;
        self.downloads
            .lock()
            .unwrap()
            .push((remote.to_string(), local.display().to_string()));
        Ok(())
    }

    async fn write_file(&self, remote: &str, contents: &[u8]) -> Result<()> {
        self.uploads.lock().unwrap().push(Upload {
            remote: remote.to_string(),
            local: None,
            contents: Some(String::from_utf8_lossy(contents).into_owned()),
        });
        Ok(())
    }
}

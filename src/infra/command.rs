//! 本地命令执行器
//!
//! 用于本机侧的协作步骤（镜像构建、打包、日志查看器容器）：
//! - 执行前回显命令
//! - stdout/stderr 实时流式输出到终端
//! - 非零退出码转换为 `HostctlError::CommandFailed`

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{HostctlError, Result};

/// 本地命令执行器
pub struct CommandRunner;

impl CommandRunner {
    /// 执行命令并把输出流式打印到终端
    pub async fn run_streaming(program: &str, args: &[&str], work_dir: &Path) -> Result<()> {
        let rendered = render(program, args);
        println!("> {}", rendered);

        let mut child = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // stdout 读取任务
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    println!("{}", line);
                }
            }
        });

        // stderr 读取任务，同时保留最后几行用于错误信息
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    eprintln!("{}", line);
                    tail.push(line);
                    if tail.len() > 20 {
                        tail.remove(0);
                    }
                }
            }
            tail.join("\n")
        });

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        debug!(command = %rendered, status = ?status.code(), "Local command finished");

        if status.success() {
            Ok(())
        } else {
            Err(HostctlError::command_failed(
                rendered,
                status.code().map(i64::from).unwrap_or(-1),
                stderr_tail,
            ))
        }
    }

    /// 执行 shell 命令 (`sh -c`)，用于需要管道的本地步骤
    pub async fn run_shell(command: &str, work_dir: &Path) -> Result<()> {
        Self::run_streaming("sh", &["-c", command], work_dir).await
    }
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

//! 容器日志：实时跟随与下载

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Sig};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::env::constants::{LOG_DRAIN_TIMEOUT, LOG_TAIL_LINES};
use crate::error::Result;
use crate::infra::{shutdown_signal, RemoteCommand};
use crate::services::ssh::client::SshSession;
use crate::services::ssh::{ExecOptions, RemoteShell};

/// 远程日志流中的一个事件
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit(u32),
}

/// 可中断的远程输出源
#[async_trait]
pub trait LogSource: Send {
    /// 下一个事件，流结束时返回 `None`
    async fn next_event(&mut self) -> Option<LogEvent>;

    /// 向远程进程发送终止信号并关闭会话
    async fn interrupt(&mut self) -> Result<()>;
}

#[async_trait]
impl LogSource for Channel<Msg> {
    async fn next_event(&mut self) -> Option<LogEvent> {
        loop {
            match self.wait().await? {
                ChannelMsg::Data { data } => return Some(LogEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    return Some(LogEvent::Stderr(data.to_vec()))
                }
                ChannelMsg::ExitStatus { exit_status } => return Some(LogEvent::Exit(exit_status)),
                _ => continue,
            }
        }
    }

    async fn interrupt(&mut self) -> Result<()> {
        self.signal(Sig::KILL).await?;
        self.close().await?;
        Ok(())
    }
}

/// 跟随结束时的情况
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FollowEnd {
    pub interrupted: bool,
    pub exit_status: Option<u32>,
}

/// `docker logs --follow`
pub fn follow_command(name: &str) -> RemoteCommand {
    RemoteCommand::new("docker")
        .args(["logs", "--follow", "--tail"])
        .arg(LOG_TAIL_LINES.to_string())
        .arg(name)
}

/// 把远程 stdout/stderr 分别写到本地输出，直到流结束
///
/// `interrupt` 完成后发送终止信号，并继续写出已经到达的输出，直到远端关闭通道；
/// 远端在 `drain` 内仍未关闭时直接返回
pub async fn follow<S, O, E, I>(
    source: &mut S,
    out: &mut O,
    err: &mut E,
    interrupt: I,
    drain: Duration,
) -> Result<FollowEnd>
where
    S: LogSource + ?Sized,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
    I: Future<Output = ()>,
{
    tokio::pin!(interrupt);
    let deadline = tokio::time::sleep(drain);
    tokio::pin!(deadline);
    let mut end = FollowEnd::default();

    loop {
        tokio::select! {
            biased;
            _ = &mut interrupt, if !end.interrupted => {
                info!("Interrupt received, stopping log stream");
                end.interrupted = true;
                deadline.as_mut().reset(Instant::now() + drain);
                source.interrupt().await?;
            }
            _ = &mut deadline, if end.interrupted => {
                warn!(timeout = ?drain, "Remote did not close the log stream, giving up");
                break;
            }
            event = source.next_event() => match event {
                Some(LogEvent::Stdout(data)) => {
                    out.write_all(&data).await?;
                    out.flush().await?;
                }
                Some(LogEvent::Stderr(data)) => {
                    err.write_all(&data).await?;
                    err.flush().await?;
                }
                Some(LogEvent::Exit(status)) => {
                    debug!(status, "Log stream process exited");
                    end.exit_status = Some(status);
                }
                None => break,
            },
        }
    }

    Ok(end)
}

/// 实时跟随容器日志，Ctrl-C 或 SIGTERM 结束
pub async fn stream_logs(session: &SshSession, name: &str) -> Result<()> {
    let mut channel = session
        .open_exec_channel(&follow_command(name), &ExecOptions::verbose())
        .await?;

    let end = follow(
        &mut channel,
        &mut tokio::io::stdout(),
        &mut tokio::io::stderr(),
        shutdown_signal(),
        LOG_DRAIN_TIMEOUT,
    )
    .await?;

    info!(container = %name, interrupted = end.interrupted, "Log stream finished");
    session.close().await
}

/// 下载完整容器日志到 `local_dir`，返回本地文件路径
pub async fn download_logs(shell: &dyn RemoteShell, name: &str, local_dir: &Path) -> Result<PathBuf> {
    let stamp = chrono::Utc::now().timestamp();
    let file_name = format!("{}-{}.log", name, stamp);
    let remote = format!("/tmp/{}", file_name);

    println!("collecting logs for {}", name);
    shell
        .run(&RemoteCommand::new("docker").arg("logs").arg(name).output_to(remote.as_str()))
        .await?;

    tokio::fs::create_dir_all(local_dir).await?;
    let local = local_dir.join(&file_name);
    shell.copy_from(&remote, &local).await?;

    shell
        .run_silent(&RemoteCommand::new("rm").arg("-f").arg(remote.as_str()))
        .await?;

    info!(container = %name, path = %local.display(), "Logs downloaded");
    Ok(local)
}

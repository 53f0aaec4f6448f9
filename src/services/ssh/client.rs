//! SSH 客户端会话 (russh)
//!
//! 一个已认证的连接，命令通过独立的 exec 通道串行执行，文件传输走同一连接上的 SFTP 子系统。

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::ssh::RemoteTarget;
use crate::error::{HostctlError, Result};
use crate::infra::RemoteCommand;

use super::{render_script, CommandOutput, Echo, ExecOptions, RemoteShell};

/// 客户端回调
pub struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        debug!(fingerprint = %server_public_key.fingerprint(), "Accepting server host key");
        Ok(true)
    }
}

/// 已认证的 SSH 会话
#[derive(Clone)]
pub struct SshSession {
    handle: Arc<Handle<ClientHandler>>,
    target: RemoteTarget,
}

impl SshSession {
    /// 连接并使用私钥认证
    pub async fn connect(target: &RemoteTarget) -> Result<Self> {
        info!(server = %target, key = %target.key_path.display(), "Connecting to server");

        let key_pair = russh_keys::load_secret_key(&target.key_path, None)?;
        let config = Arc::new(client::Config::default());

        let mut handle = client::connect(config, (target.host.as_str(), target.port), ClientHandler).await?;
        let authenticated = handle
            .authenticate_publickey(target.user.as_str(), Arc::new(key_pair))
            .await?;
        if !authenticated {
            return Err(HostctlError::AuthRejected {
                user: target.user.clone(),
                host: target.host.clone(),
            });
        }

        debug!(server = %target, "SSH session established");

        Ok(Self {
            handle: Arc::new(handle),
            target: target.clone(),
        })
    }

    /// 打开一个执行指定命令的通道（由调用方读取输出，用于日志跟随）
    pub async fn open_exec_channel(&self, cmd: &RemoteCommand, opts: &ExecOptions) -> Result<Channel<Msg>> {
        let script = render_script(cmd, opts, self.target.needs_sudo());
        if opts.echo == Echo::Verbose {
            println!("> {}", cmd);
        }
        let channel = self.handle.channel_open_session().await?;
        channel.exec(true, script.as_str()).await?;
        Ok(channel)
    }

    /// 打开到远程 Unix socket 的通道
    pub async fn open_socket_channel(&self, socket_path: &str) -> Result<Channel<Msg>> {
        Ok(self.handle.channel_open_direct_streamlocal(socket_path).await?)
    }

    /// 断开连接
    pub async fn close(&self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }

    async fn sftp(&self) -> Result<SftpSession> {
        let channel = self.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        Ok(SftpSession::new(channel.into_stream()).await?)
    }

    /// 非 root 用户先写入 /tmp，再提权移动
    fn staging_path(&self, remote: &str) -> String {
        if self.target.needs_sudo() {
            format!("/tmp/hostctl-{}", Uuid::new_v4())
        } else {
            remote.to_string()
        }
    }

    async fn upload_from<R>(&self, reader: &mut R, remote: &str) -> Result<u64>
    where
        R: tokio::io::AsyncRead + Unpin + Send,
    {
        let staging = self.staging_path(remote);
        let sftp = self.sftp().await?;
        let mut file = sftp.create(staging.clone()).await?;
        let bytes = tokio::io::copy(reader, &mut file).await?;
        file.shutdown().await?;

        if staging != remote {
            self.run_silent(&RemoteCommand::new("mv").arg(&staging).arg(remote))
                .await?;
        }
        Ok(bytes)
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn exec(&self, cmd: &RemoteCommand, opts: &ExecOptions) -> Result<CommandOutput> {
        let verbose = opts.echo == Echo::Verbose;
        let mut channel = self.open_exec_channel(cmd, opts).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => {
                    if verbose {
                        let _ = std::io::stdout().write_all(data);
                    }
                    stdout.extend_from_slice(data);
                }
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    if verbose {
                        let _ = std::io::stderr().write_all(data);
                    }
                    stderr.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    status = Some(exit_status);
                }
                _ => {}
            }
        }

        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        let Some(status) = status else {
            return Err(HostctlError::command_failed(
                cmd.render(),
                -1,
                format!("remote command ended without an exit status {}", stderr),
            ));
        };

        debug!(command = %cmd, status, "Remote command finished");

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr,
            status: i64::from(status),
        })
    }

    async fn copy_to(&self, local: &Path, remote: &str) -> Result<()> {
        let mut source = tokio::fs::File::open(local).await?;
        let bytes = self.upload_from(&mut source, remote).await?;
        info!(local = %local.display(), remote = %remote, bytes, "Uploaded file");
        Ok(())
    }

    async fn copy_from(&self, remote: &str, local: &Path) -> Result<()> {
        let staging = self.staging_path(remote);
        if staging != remote {
            self.run_silent(
                &RemoteCommand::script(format!(
                    "cp {src} {dst} && chmod 644 {dst}",
                    src = crate::infra::shell_quote(remote),
                    dst = crate::infra::shell_quote(&staging),
                )),
            )
            .await?;
        }

        let sftp = self.sftp().await?;
        let mut source = sftp.open(staging.clone()).await?;
        let mut dest = tokio::fs::File::create(local).await?;
        let bytes = tokio::io::copy(&mut source, &mut dest).await?;
        dest.flush().await?;

        if staging != remote {
            self.run_silent(&RemoteCommand::new("rm").arg("-f").arg(&staging))
                .await?;
        }

        info!(remote = %remote, local = %local.display(), bytes, "Downloaded file");
        Ok(())
    }

    async fn write_file(&self, remote: &str, contents: &[u8]) -> Result<()> {
        let mut reader = contents;
        let bytes = self.upload_from(&mut reader, remote).await?;
        debug!(remote = %remote, bytes, "Wrote remote file");
        Ok(())
    }
}

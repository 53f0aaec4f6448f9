//! 镜像传输：从仓库拉取，或直接上传压缩镜像包并加载

use std::path::Path;

use tracing::info;

use crate::domain::deploy::DeploymentSpec;
use crate::error::{HostctlError, Result};
use crate::infra::RemoteCommand;
use crate::services::ssh::RemoteShell;

/// 仓库模式：拉取镜像
pub fn pull_command(spec: &DeploymentSpec) -> RemoteCommand {
    RemoteCommand::new("docker").arg("pull").arg(spec.image_ref())
}

/// 直接模式：解压并加载镜像包
pub fn load_command(spec: &DeploymentSpec) -> RemoteCommand {
    RemoteCommand::new("docker")
        .arg("load")
        .piped_from(RemoteCommand::new("gunzip").arg("-c").arg(spec.remote_archive_path()))
}

/// 把镜像送到主机上
///
/// 直接模式需要本地镜像包路径
pub async fn transfer_image(shell: &dyn RemoteShell, spec: &DeploymentSpec, archive: Option<&Path>) -> Result<()> {
    if !spec.is_direct() {
        println!("pulling {}", spec.image_ref());
        shell.run(&pull_command(spec)).await?;
        info!(image = %spec.image_ref(), "Image pulled");
        return Ok(());
    }

    let archive = archive.ok_or_else(|| {
        HostctlError::config(format!("direct deployment requires a local {}", spec.image_archive_name()))
    })?;

    println!("uploading image archive {}", archive.display());
    let remote = spec.remote_archive_path();
    shell.copy_to(archive, &remote).await?;
    shell.run(&load_command(spec)).await?;
    shell.run(&RemoteCommand::new("rm").arg("-f").arg(&remote)).await?;

    info!(image = %spec.image_ref(), "Image loaded from archive");
    Ok(())
}

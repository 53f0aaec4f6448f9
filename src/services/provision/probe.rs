//! 主机探测
//!
//! 先读取 `/etc/os-release`，无法识别时按固定顺序检查标记文件；都不匹配则失败，不猜测包管理器。

use tracing::info;

use crate::domain::host::{HostOsClass, OS_MARKER_FILES};
use crate::error::{HostctlError, Result};
use crate::infra::RemoteCommand;
use crate::services::ssh::{ExecOptions, RemoteShell};

const OS_RELEASE: &str = "/etc/os-release";

/// 识别主机操作系统家族
pub async fn detect_os_family(shell: &dyn RemoteShell) -> Result<HostOsClass> {
    let release = shell
        .exec(&RemoteCommand::new("cat").arg(OS_RELEASE), &ExecOptions::silent())
        .await?;

    if release.success() {
        if let Some(class) = HostOsClass::from_os_release(&release.stdout) {
            info!(os = %class, "Detected host os");
            return Ok(class);
        }
    }

    for (marker, class) in OS_MARKER_FILES {
        if shell.probe(&RemoteCommand::new("test").arg("-f").arg(marker)).await? {
            info!(os = %class, marker, "Detected host os from marker file");
            return Ok(class);
        }
    }

    Err(HostctlError::UnknownHostOs)
}

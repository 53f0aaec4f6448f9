//! 容器运行时 (Docker) 安装与启动
//!
//! 状态机：探测 `docker --version` → 已安装且非 recover 模式时直接返回；
//! 否则识别系统家族并严格按顺序执行安装命令，遇到第一条失败即中止。

use tracing::info;

use crate::domain::host::HostOsClass;
use crate::error::{HostctlError, Result};
use crate::infra::RemoteCommand;
use crate::services::provision::probe::detect_os_family;
use crate::services::ssh::RemoteShell;

const DAEMON_CONFIG: &str = "/etc/docker/daemon.json";
const DAEMON_CONFIG_BODY: &str = r#"{"log-driver": "local"}"#;

/// Debian/Ubuntu 上与 docker-ce 冲突的旧包
const DEBIAN_CONFLICTS: &str = "docker.io docker-doc docker-compose docker-compose-v2 podman-docker containerd runc";

/// RHEL 系与 Amazon Linux 上的旧包
const RPM_CONFLICTS: [&str; 8] = [
    "docker",
    "docker-client",
    "docker-client-latest",
    "docker-common",
    "docker-latest",
    "docker-latest-logrotate",
    "docker-logrotate",
    "docker-engine",
];

const DOCKER_CE_PACKAGES: [&str; 5] = [
    "docker-ce",
    "docker-ce-cli",
    "containerd.io",
    "docker-buildx-plugin",
    "docker-compose-plugin",
];

/// 按系统家族生成有序的安装命令
pub fn install_commands(os: HostOsClass) -> Vec<RemoteCommand> {
    let mut cmds = match os {
        HostOsClass::Debian => vec![
            RemoteCommand::new("apt-get").arg("update"),
            RemoteCommand::new("apt-get").args(["upgrade", "-y"]),
            RemoteCommand::script(format!(
                "for pkg in {}; do apt-get remove -y $pkg || true; done",
                DEBIAN_CONFLICTS
            )),
            RemoteCommand::new("apt-get").arg("update"),
            RemoteCommand::new("apt-get").args(["install", "-y", "ca-certificates", "curl"]),
            RemoteCommand::new("install").args(["-m", "0755", "-d", "/etc/apt/keyrings"]),
            RemoteCommand::script(
                "curl -fsSL https://download.docker.com/linux/$(. /etc/os-release && echo \"$ID\")/gpg \
                 -o /etc/apt/keyrings/docker.asc",
            ),
            RemoteCommand::new("chmod").args(["a+r", "/etc/apt/keyrings/docker.asc"]),
            RemoteCommand::script(
                "echo \"deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.asc] \
                 https://download.docker.com/linux/$(. /etc/os-release && echo \"$ID\") \
                 $(. /etc/os-release && echo \"$VERSION_CODENAME\") stable\" \
                 > /etc/apt/sources.list.d/docker.list",
            ),
            RemoteCommand::new("apt-get").arg("update"),
            RemoteCommand::new("apt-get")
                .args(["install", "-y"])
                .args(DOCKER_CE_PACKAGES),
        ],
        HostOsClass::AmazonLinux => vec![
            RemoteCommand::new("dnf").args(["update", "-y"]),
            RemoteCommand::new("dnf").args(["remove", "-y"]).args(RPM_CONFLICTS),
            RemoteCommand::new("dnf").args(["install", "-y", "docker"]),
        ],
        HostOsClass::Rhel => vec![
            RemoteCommand::new("yum").args(["update", "-y"]),
            RemoteCommand::new("yum").args(["remove", "-y"]).args(RPM_CONFLICTS),
            RemoteCommand::new("yum").args(["install", "-y", "yum-utils", "device-mapper-persistent-data", "lvm2"]),
            RemoteCommand::new("yum-config-manager")
                .args(["--add-repo", "https://download.docker.com/linux/centos/docker-ce.repo"]),
            RemoteCommand::new("yum").args(["install", "-y"]).args(DOCKER_CE_PACKAGES),
        ],
    };

    // 所有家族共用：本地日志轮转，启用并重启服务
    cmds.push(RemoteCommand::new("mkdir").args(["-p", "/etc/docker"]));
    cmds.push(
        RemoteCommand::new("echo")
            .arg(DAEMON_CONFIG_BODY)
            .stdout_to(DAEMON_CONFIG),
    );
    cmds.push(RemoteCommand::new("systemctl").args(["enable", "docker"]));
    cmds.push(RemoteCommand::new("systemctl").args(["restart", "docker"]));
    cmds
}

/// 确保 Docker 已安装
///
/// `recover` 为 true 时跳过“已安装”短路，强制重新安装
pub async fn ensure_installed(shell: &dyn RemoteShell, recover: bool) -> Result<()> {
    if !recover && shell.probe(&RemoteCommand::new("docker").arg("--version")).await? {
        info!("Docker already installed");
        return Ok(());
    }

    println!("installing docker on server");
    let os = detect_os_family(shell).await?;
    println!("detected host os: {}", os);

    for cmd in install_commands(os) {
        shell.run(&cmd).await?;
    }

    info!(os = %os, recover, "Docker installed");
    Ok(())
}

/// 确保 Docker 服务处于运行状态
///
/// 启用失败与重启失败分别报告
pub async fn ensure_running(shell: &dyn RemoteShell) -> Result<()> {
    let active = shell
        .probe(&RemoteCommand::new("systemctl").args(["is-active", "--quiet", "docker"]))
        .await?;
    if active {
        return Ok(());
    }

    println!("starting docker on server");

    shell
        .run(&RemoteCommand::new("systemctl").args(["enable", "docker"]))
        .await
        .map_err(|e| HostctlError::RuntimeEnable(Box::new(e)))?;

    shell
        .run(&RemoteCommand::new("systemctl").args(["restart", "docker"]))
        .await
        .map_err(|e| HostctlError::RuntimeRestart(Box::new(e)))?;

    info!("Docker service started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ssh::mock::RecordingShell;

    #[tokio::test]
    async fn test_installed_is_noop() {
        let shell = RecordingShell::new().respond("docker --version", "Docker version 27.0.1");
        ensure_installed(&shell, false).await.unwrap();
        assert_eq!(shell.commands(), vec!["docker --version"]);
    }

    #[tokio::test]
    async fn test_recover_reinstalls() {
        let shell = RecordingShell::new()
            .respond("docker --version", "Docker version 27.0.1")
            .respond("cat /etc/os-release", "ID=amzn\n");
        ensure_installed(&shell, true).await.unwrap();

        assert!(!shell.ran("docker --version"));
        assert!(shell.ran("dnf install -y docker"));
        let restart = shell.position("systemctl restart docker").unwrap();
        let install = shell.position("dnf install").unwrap();
        assert!(install < restart);
    }

    #[tokio::test]
    async fn test_install_aborts_on_first_failure() {
        let shell = RecordingShell::new()
            .fail("docker --version", 127, "docker: not found")
            .respond("cat /etc/os-release", "ID=rhel\n")
            .fail("yum-config-manager", 1, "repo unreachable");

        let err = ensure_installed(&shell, false).await.unwrap_err();
        assert!(matches!(err, HostctlError::CommandFailed { .. }));
        assert!(!shell.ran("docker-ce-cli"));
        assert!(!shell.ran("systemctl"));
    }

    #[tokio::test]
    async fn test_install_unknown_os_fails() {
        let shell = RecordingShell::new()
            .fail("docker --version", 127, "")
            .respond("cat /etc/os-release", "ID=arch\n")
            .fail("test -f", 1, "");
        assert!(matches!(
            ensure_installed(&shell, false).await,
            Err(HostctlError::UnknownHostOs)
        ));
        assert!(!shell.ran("apt-get"));
    }

    #[test]
    fn test_install_commands_shape() {
        let debian: Vec<String> = install_commands(HostOsClass::Debian)
            .iter()
            .map(RemoteCommand::render)
            .collect();
        assert_eq!(debian[0], "apt-get update");
        assert!(debian.iter().any(|c| c.contains("signed-by=/etc/apt/keyrings/docker.asc")));
        assert_eq!(
            debian[debian.len() - 3],
            r#"echo '{"log-driver": "local"}' > /etc/docker/daemon.json"#
        );
        assert_eq!(debian.last().unwrap(), "systemctl restart docker");

        let amzn = install_commands(HostOsClass::AmazonLinux);
        assert_eq!(amzn[0].render(), "dnf update -y");
    }

    #[tokio::test]
    async fn test_ensure_running_active() {
        let shell = RecordingShell::new();
        ensure_running(&shell).await.unwrap();
        assert_eq!(shell.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_running_distinct_errors() {
        let shell = RecordingShell::new()
            .fail("is-active", 3, "")
            .fail("systemctl enable", 1, "unit not found");
        assert!(matches!(
            ensure_running(&shell).await,
            Err(HostctlError::RuntimeEnable(_))
        ));

        let shell = RecordingShell::new()
            .fail("is-active", 3, "")
            .fail("systemctl restart", 1, "failed");
        assert!(matches!(
            ensure_running(&shell).await,
            Err(HostctlError::RuntimeRestart(_))
        ));
    }
}

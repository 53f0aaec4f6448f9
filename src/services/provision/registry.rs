//! 镜像仓库认证
//!
//! 配置了认证文件时直接复制到主机；否则安装提供商 CLI 并以非交互方式登录。
//! 未知提供商在发出任何远程命令之前失败。

use std::path::Path;

use tracing::info;

use crate::config::env::constants::{DOCKER_AUTH_DIR, DOCKER_AUTH_PATH, DOCTL_VERSION};
use crate::domain::deploy::DeploymentSpec;
use crate::domain::host::HostOsClass;
use crate::domain::registry::{ecr_region, RegistryClass};
use crate::error::{HostctlError, Result};
use crate::infra::RemoteCommand;
use crate::services::provision::probe::detect_os_family;
use crate::services::ssh::RemoteShell;

/// 提供商 CLI 的版本探测命令
fn tools_probe(class: RegistryClass) -> Option<RemoteCommand> {
    match class {
        RegistryClass::Ecr => Some(RemoteCommand::new("aws").arg("--version")),
        RegistryClass::DigitalOcean => Some(RemoteCommand::new("doctl").arg("version")),
        RegistryClass::Unsupported => None,
    }
}

/// 按提供商与系统家族生成 CLI 安装命令
pub fn tools_install_commands(class: RegistryClass, os: HostOsClass) -> Result<Vec<RemoteCommand>> {
    match (class, os) {
        (RegistryClass::Ecr, HostOsClass::Debian) => Ok(vec![
            RemoteCommand::new("apt-get").arg("update"),
            RemoteCommand::new("apt-get").args(["install", "-y", "awscli"]),
        ]),
        // Amazon Linux 预装 aws cli
        (RegistryClass::Ecr, HostOsClass::AmazonLinux) => Ok(Vec::new()),
        (RegistryClass::Ecr, HostOsClass::Rhel) => {
            Ok(vec![RemoteCommand::new("yum").args(["install", "-y", "awscli"])])
        }
        (RegistryClass::DigitalOcean, _) => {
            let url = format!(
                "https://github.com/digitalocean/doctl/releases/download/v{v}/doctl-{v}-linux-amd64.tar.gz",
                v = DOCTL_VERSION
            );
            Ok(vec![RemoteCommand::new("tar")
                .args(["-xzC", "/usr/local/bin"])
                .piped_from(RemoteCommand::new("curl").arg("-sL").arg(url))])
        }
        (RegistryClass::Unsupported, _) => Err(HostctlError::UnsupportedRegistry(
            "no tooling for unsupported registry".to_string(),
        )),
    }
}

/// 提供商登录命令
pub fn login_command(class: RegistryClass, registry: &str) -> Result<RemoteCommand> {
    match class {
        RegistryClass::Ecr => {
            let region = ecr_region(registry)?;
            Ok(RemoteCommand::new("docker")
                .args(["login", "--username", "AWS", "--password-stdin", registry])
                .piped_from(
                    RemoteCommand::new("aws")
                        .args(["ecr", "get-login-password", "--region"])
                        .arg(region),
                ))
        }
        RegistryClass::DigitalOcean => Ok(RemoteCommand::new("doctl").args(["registry", "login"])),
        RegistryClass::Unsupported => Err(HostctlError::UnsupportedRegistry(registry.to_string())),
    }
}

/// 确保提供商 CLI 已安装
async fn ensure_tools_installed(shell: &dyn RemoteShell, class: RegistryClass, recover: bool) -> Result<()> {
    if !recover {
        if let Some(probe) = tools_probe(class) {
            if shell.probe(&probe).await? {
                return Ok(());
            }
        }
    }

    println!("installing registry tools on server");
    let os = detect_os_family(shell).await?;
    for cmd in tools_install_commands(class, os)? {
        shell.run(&cmd).await?;
    }
    Ok(())
}

/// 确保主机已登录镜像仓库
///
/// 未配置仓库时（直接部署模式）不做任何事
pub async fn ensure_authenticated(shell: &dyn RemoteShell, spec: &DeploymentSpec, recover: bool) -> Result<()> {
    let Some(ref registry) = spec.registry else {
        println!("no container registry in use, skipping authentication");
        return Ok(());
    };

    // 预先生成的认证文件：本地校验后复制，不登录
    if let Some(ref auth_file) = spec.auth_file {
        if !Path::new(auth_file).is_file() {
            return Err(HostctlError::AuthFileMissing(auth_file.clone()));
        }
        println!("copying docker auth file");
        shell
            .run(&RemoteCommand::new("mkdir").args(["-p", DOCKER_AUTH_DIR]))
            .await?;
        shell.copy_to(Path::new(auth_file), DOCKER_AUTH_PATH).await?;
        info!(registry = %registry, "Registry auth file installed");
        return Ok(());
    }

    let class = RegistryClass::classify(registry);
    // 失败关闭：先构造登录命令，未知提供商在任何远程命令之前返回错误
    let login = login_command(class, registry)?;

    println!("no docker registry auth file specified, attempting docker login");
    ensure_tools_installed(shell, class, recover).await?;

    println!("authenticating to {} registry", class);
    shell.run_in_app(&login, &spec.name).await?;

    info!(registry = %registry, provider = %class, "Registry login succeeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deploy::WebAdvancedConfig;
    use crate::services::ssh::mock::RecordingShell;

    fn spec(registry: Option<&str>, auth_file: Option<String>) -> DeploymentSpec {
        DeploymentSpec {
            name: "alpha".to_string(),
            registry: registry.map(str::to_string),
            web: false,
            hostname: None,
            email: "ops@example.com".to_string(),
            volumes: Vec::new(),
            environment_file: None,
            auth_file,
            platform: "linux/amd64".to_string(),
            build_arg_file: None,
            web_advanced: WebAdvancedConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_unsupported_registry_issues_no_commands() {
        let shell = RecordingShell::new();
        let result = ensure_authenticated(&shell, &spec(Some("ghcr.io/me"), None), false).await;
        assert!(matches!(result, Err(HostctlError::UnsupportedRegistry(_))));
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_no_registry_is_noop() {
        let shell = RecordingShell::new();
        ensure_authenticated(&shell, &spec(None, None), false).await.unwrap();
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn test_ecr_login() {
        let shell = RecordingShell::new().respond("aws --version", "aws-cli/2.15");
        let registry = "123456789012.dkr.ecr.us-east-1.amazonaws.com";
        ensure_authenticated(&shell, &spec(Some(registry), None), false)
            .await
            .unwrap();

        let commands = shell.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[1].starts_with("if [ -f /etc/alpha/alpha.env ]"));
        assert!(commands[1].ends_with(
            "aws ecr get-login-password --region us-east-1 | docker login --username AWS --password-stdin 123456789012.dkr.ecr.us-east-1.amazonaws.com"
        ));
    }

    #[tokio::test]
    async fn test_ecr_login_as_non_root_user() {
        let shell = RecordingShell::new()
            .with_sudo()
            .respond("aws --version", "aws-cli/2.15");
        let registry = "123456789012.dkr.ecr.us-east-1.amazonaws.com";
        ensure_authenticated(&shell, &spec(Some(registry), None), false)
            .await
            .unwrap();

        // 管道与环境文件守卫都在同一个 `sudo sh -c` 里执行
        assert_eq!(
            shell.commands(),
            vec![
                "sudo sh -c 'aws --version'".to_string(),
                "sudo sh -c 'if [ -f /etc/alpha/alpha.env ]; then set -a; . /etc/alpha/alpha.env; set +a; fi; \
                 aws ecr get-login-password --region us-east-1 | \
                 docker login --username AWS --password-stdin 123456789012.dkr.ecr.us-east-1.amazonaws.com'"
                    .to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_digitalocean_installs_tools_when_missing() {
        let shell = RecordingShell::new()
            .fail("doctl version", 127, "not found")
            .respond("cat /etc/os-release", "ID=ubuntu\n");
        ensure_authenticated(&shell, &spec(Some("registry.digitalocean.com/team"), None), false)
            .await
            .unwrap();

        let install = shell.position("tar -xzC /usr/local/bin").unwrap();
        let login = shell.position("doctl registry login").unwrap();
        assert!(install < login);
        assert!(shell.commands()[install].starts_with("curl -sL https://github.com/digitalocean/doctl"));
    }

    #[tokio::test]
    async fn test_auth_file_copied_without_login() {
        let dir = tempfile::tempdir().unwrap();
        let auth = dir.path().join("config.json");
        std::fs::write(&auth, "{}").unwrap();

        let shell = RecordingShell::new();
        let spec = spec(Some("ghcr.io/me"), Some(auth.display().to_string()));
        ensure_authenticated(&shell, &spec, false).await.unwrap();

        assert_eq!(shell.commands(), vec!["mkdir -p /root/.docker"]);
        assert_eq!(shell.uploads()[0].remote, "/root/.docker/config.json");
    }

    #[tokio::test]
    async fn test_missing_auth_file_fails_before_remote() {
        let shell = RecordingShell::new();
        let spec = spec(Some("registry.digitalocean.com/t"), Some("/nonexistent/config.json".to_string()));
        assert!(matches!(
            ensure_authenticated(&shell, &spec, false).await,
            Err(HostctlError::AuthFileMissing(_))
        ));
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn test_ecr_tools_on_amazon_linux() {
        assert!(tools_install_commands(RegistryClass::Ecr, HostOsClass::AmazonLinux)
            .unwrap()
            .is_empty());
    }
}

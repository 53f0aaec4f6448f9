//! 部署编排
//!
//! 严格串行，遇到第一个错误即中止，已完成的步骤不自动回滚：
//! 运行时 → 仓库认证 → 反向代理（仅 Web）→ 主机暂存 → 镜像传输 → 拆除旧容器 → 启动新容器

pub mod build;
pub mod container;
pub mod context;
pub mod image;
pub mod staging;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::deploy::DeploymentSpec;
use crate::error::{HostctlError, Result};
use crate::services::provision::{proxy, registry, runtime};
use crate::services::ssh::RemoteShell;

pub use context::StageTracker;

/// 部署阶段 (标识, 显示名)
pub const DEPLOY_STAGES: [(&str, &str); 8] = [
    ("build", "Build Image"),
    ("runtime", "Container Runtime"),
    ("registry", "Registry Auth"),
    ("proxy", "Reverse Proxy"),
    ("stage_host", "Stage Host"),
    ("image", "Image Transfer"),
    ("teardown", "Teardown"),
    ("launch", "Launch"),
];

/// 部署选项
#[derive(Clone, Debug, Default)]
pub struct DeployOptions {
    /// 强制重新安装运行时与仓库工具
    pub recover: bool,
    /// 直接部署使用的本地镜像包
    pub archive: Option<PathBuf>,
}

/// 本地文件检查（环境文件、仓库认证文件），构建之前即可执行
pub fn check_local_files(spec: &DeploymentSpec) -> Result<()> {
    if let Some(ref env_file) = spec.environment_file {
        if !Path::new(env_file).is_file() {
            return Err(HostctlError::config(format!("environment file not found: {}", env_file)));
        }
    }

    if spec.registry.is_some() {
        if let Some(ref auth_file) = spec.auth_file {
            if !Path::new(auth_file).is_file() {
                return Err(HostctlError::AuthFileMissing(auth_file.clone()));
            }
        }
    }
    Ok(())
}

/// 前置条件检查，在任何远程修改之前失败
pub fn preflight(spec: &DeploymentSpec, opts: &DeployOptions) -> Result<()> {
    check_local_files(spec)?;

    if spec.is_direct() {
        match opts.archive {
            Some(ref archive) if archive.is_file() => {}
            Some(ref archive) => {
                return Err(HostctlError::config(format!(
                    "image archive not found: {}",
                    archive.display()
                )))
            }
            None => {
                return Err(HostctlError::config(format!(
                    "direct deployment requires a local {}",
                    spec.image_archive_name()
                )))
            }
        }
    }

    Ok(())
}

/// 运行时安装 + 服务运行检查（`server` / `recover` 命令与部署共用）
pub async fn provision_runtime(shell: &dyn RemoteShell, recover: bool) -> Result<()> {
    runtime::ensure_installed(shell, recover).await?;
    runtime::ensure_running(shell).await
}

/// 远程部署流水线（本地构建之后的全部步骤）
pub async fn run_pipeline(
    shell: &dyn RemoteShell,
    spec: &DeploymentSpec,
    opts: &DeployOptions,
    tracker: &mut StageTracker,
) -> Result<()> {
    preflight(spec, opts)?;

    tracker
        .track("runtime", provision_runtime(shell, opts.recover))
        .await?;

    if spec.registry.is_some() {
        tracker
            .track("registry", registry::ensure_authenticated(shell, spec, opts.recover))
            .await?;
    } else {
        tracker.skip("registry", "direct deployment");
    }

    if spec.web {
        let outcome = tracker
            .track("proxy", proxy::ensure_setup(shell, &spec.email, &spec.web_advanced))
            .await?;
        tracker.note("proxy", format!("{:?}", outcome).to_lowercase());
    } else {
        tracker.skip("proxy", "not a web service");
    }

    let env_staged = tracker
        .track("stage_host", staging::stage_host(shell, spec))
        .await?;

    tracker
        .track("image", image::transfer_image(shell, spec, opts.archive.as_deref()))
        .await?;

    let replaced = tracker
        .track("teardown", container::teardown(shell, &spec.name))
        .await?;

    tracker
        .track("launch", container::launch(shell, spec, env_staged, replaced))
        .await?;

    info!(app = %spec.name, image = %spec.image_ref(), "Deployment finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deploy::{StageStatus, WebAdvancedConfig};
    use crate::domain::proxy::Timeout;
    use crate::services::ssh::mock::RecordingShell;

    fn alpha() -> DeploymentSpec {
        DeploymentSpec {
            name: "alpha".to_string(),
            registry: Some("registry.example.com".to_string()),
            web: true,
            hostname: Some("alpha.example.com".to_string()),
            email: "ops@example.com".to_string(),
            volumes: Vec::new(),
            environment_file: None,
            // 认证文件存在时跳过提供商分类，测试用的仓库无需是 ECR/DO
            auth_file: None,
            platform: "linux/amd64".to_string(),
            build_arg_file: None,
            web_advanced: WebAdvancedConfig::default(),
        }
    }

    fn with_auth_file(mut spec: DeploymentSpec, dir: &tempfile::TempDir) -> DeploymentSpec {
        let auth = dir.path().join("config.json");
        std::fs::write(&auth, "{}").unwrap();
        spec.auth_file = Some(auth.display().to_string());
        spec
    }

    /// 空主机：docker 已安装并运行，代理未运行，没有同名容器
    fn empty_host() -> RecordingShell {
        RecordingShell::new().respond("docker --version", "Docker version 27.0.1")
    }

    #[tokio::test]
    async fn test_alpha_on_empty_host() {
        let dir = tempfile::tempdir().unwrap();
        let spec = with_auth_file(alpha(), &dir);
        let shell = empty_host();
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        run_pipeline(&shell, &spec, &DeployOptions::default(), &mut tracker)
            .await
            .unwrap();

        assert!(shell.ran("mkdir -p /etc/alpha"));
        assert!(shell.ran("mkdir -p /var/alpha"));
        assert!(shell.ran("docker pull registry.example.com/alpha:latest"));
        assert!(!shell.ran("docker rm --force alpha"));
        assert!(!shell.ran("docker stop alpha"));

        let run = shell.position("docker run -d --restart always --name alpha").unwrap();
        let launched = &shell.commands()[run];
        assert!(launched.contains("Host(`alpha.example.com`) || Host(`www.alpha.example.com`)"));
        assert!(launched.contains("--network traefik"));

        assert_eq!(tracker.get("launch").unwrap().status, StageStatus::Success);
        assert_eq!(tracker.get("build").unwrap().status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn test_alpha_as_non_root_user() {
        let dir = tempfile::tempdir().unwrap();
        let spec = with_auth_file(alpha(), &dir);
        let shell = empty_host().with_sudo();
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        run_pipeline(&shell, &spec, &DeployOptions::default(), &mut tracker)
            .await
            .unwrap();

        let commands = shell.commands();
        assert!(commands.iter().all(|c| c.starts_with("sudo sh -c ")), "{commands:#?}");
        assert!(shell.ran("sudo sh -c 'mkdir -p /etc/alpha"));

        let run = shell.position("docker run -d --restart always --name alpha").unwrap();
        assert!(commands[run].starts_with("sudo sh -c 'docker run -d --restart always --name alpha"));
        // 标签原有的单引号在外层引号中被转义
        assert!(commands[run].contains(r"'\''traefik.http.routers.alpha.rule=Host(`alpha.example.com`)"));
        assert_eq!(tracker.get("launch").unwrap().status, StageStatus::Success);
    }

    #[tokio::test]
    async fn test_pull_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = with_auth_file(alpha(), &dir);
        spec.web = false;
        let shell = empty_host().respond("docker ps -a", "alpha\n");
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        run_pipeline(&shell, &spec, &DeployOptions::default(), &mut tracker)
            .await
            .unwrap();

        let mkdir = shell.position("mkdir -p /var/alpha").unwrap();
        let pull = shell.position("docker pull").unwrap();
        let rm = shell.position("docker rm --force alpha").unwrap();
        let run = shell.position("docker run").unwrap();
        assert!(mkdir < pull);
        assert!(pull < rm);
        assert!(rm < run);
        assert_eq!(tracker.get("proxy").unwrap().status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_failed_pull_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let spec = with_auth_file(alpha(), &dir);
        let shell = empty_host().fail("docker pull", 1, "manifest unknown");
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        let err = run_pipeline(&shell, &spec, &DeployOptions::default(), &mut tracker)
            .await
            .unwrap_err();
        assert!(matches!(err, HostctlError::CommandFailed { .. }));
        assert!(!shell.ran("docker run -d --restart always --name alpha"));
        assert!(!shell.ran("docker rm --force alpha"));
        assert_eq!(tracker.get("image").unwrap().status, StageStatus::Failed);
        assert_eq!(tracker.get("teardown").unwrap().status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn test_launch_failure_after_teardown() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = with_auth_file(alpha(), &dir);
        spec.web = false;
        let shell = empty_host()
            .respond("docker ps -a", "alpha\n")
            .fail("docker run", 125, "invalid reference format");
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        let err = run_pipeline(&shell, &spec, &DeployOptions::default(), &mut tracker)
            .await
            .unwrap_err();
        assert!(matches!(err, HostctlError::LaunchAfterTeardown { .. }));
    }

    #[tokio::test]
    async fn test_direct_deployment_loads_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("alpha.tar.gz");
        std::fs::write(&archive, b"not really gzip").unwrap();

        let mut spec = alpha();
        spec.registry = None;
        spec.web = false;
        let shell = empty_host();
        let opts = DeployOptions {
            recover: false,
            archive: Some(archive.clone()),
        };
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        run_pipeline(&shell, &spec, &opts, &mut tracker).await.unwrap();

        assert_eq!(shell.uploads()[0].remote, "/tmp/alpha.tar.gz");
        let load = shell.position("gunzip -c /tmp/alpha.tar.gz | docker load").unwrap();
        let cleanup = shell.position("rm -f /tmp/alpha.tar.gz").unwrap();
        let run = shell.position("docker run").unwrap();
        assert!(load < cleanup && cleanup < run);
        assert!(shell.commands()[run].ends_with("alpha:latest"));
        assert!(!shell.ran("docker pull"));
        assert_eq!(tracker.get("registry").unwrap().status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_preflight_fails_before_remote() {
        let mut spec = alpha();
        spec.environment_file = Some("/nonexistent/.env".to_string());
        let shell = empty_host();
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        assert!(run_pipeline(&shell, &spec, &DeployOptions::default(), &mut tracker)
            .await
            .is_err());
        assert!(shell.commands().is_empty());

        let mut direct = alpha();
        direct.registry = None;
        assert!(preflight(&direct, &DeployOptions::default()).is_err());
    }

    #[tokio::test]
    async fn test_env_file_staged_and_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "KEY=value\n").unwrap();

        let mut spec = with_auth_file(alpha(), &dir);
        spec.web = false;
        spec.environment_file = Some(env_file.display().to_string());
        let shell = empty_host();
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        run_pipeline(&shell, &spec, &DeployOptions::default(), &mut tracker)
            .await
            .unwrap();

        assert!(shell
            .uploads()
            .iter()
            .any(|u| u.remote == "/etc/alpha/alpha.env"));
        let run = shell.position("docker run").unwrap();
        assert!(shell.commands()[run].contains("--env-file /etc/alpha/alpha.env"));
    }

    #[tokio::test]
    async fn test_web_timeouts_reach_fresh_proxy_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = with_auth_file(alpha(), &dir);
        spec.web_advanced.idle_timeout = Timeout::Seconds(300);
        let shell = empty_host();
        let mut tracker = StageTracker::new(&DEPLOY_STAGES);

        run_pipeline(&shell, &spec, &DeployOptions::default(), &mut tracker)
            .await
            .unwrap();

        let config = shell
            .uploads()
            .into_iter()
            .find(|u| u.remote == "/etc/traefik/traefik.yml")
            .and_then(|u| u.contents)
            .unwrap();
        assert!(config.contains("idleTimeout: 300s"));
        assert_eq!(tracker.get("proxy").unwrap().message.as_deref(), Some("installed"));
    }
}

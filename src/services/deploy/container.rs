//! 应用容器：状态、拆除与启动

use tracing::{info, warn};

use crate::config::env::constants::{APP_INTERNAL_PORT, PROXY_NAME};
use crate::domain::deploy::{app_data_dir, app_env_file, DeploymentSpec};
use crate::domain::proxy::{CERT_RESOLVER, ENTRY_POINT_WEBSECURE};
use crate::error::{HostctlError, Result};
use crate::infra::RemoteCommand;
use crate::services::ssh::RemoteShell;

/// 精确匹配容器名的过滤器
fn name_filter(name: &str) -> String {
    format!("name=^/{}$", name)
}

/// Traefik 路由标签
pub fn router_labels(spec: &DeploymentSpec) -> Vec<String> {
    let name = &spec.name;
    let host = spec.hostname.as_deref().unwrap_or_default();

    let mut labels = vec![
        "traefik.enable=true".to_string(),
        format!(
            "traefik.http.routers.{}.rule=Host(`{}`) || Host(`www.{}`)",
            name, host, host
        ),
        format!("traefik.http.routers.{}.entrypoints={}", name, ENTRY_POINT_WEBSECURE),
        format!("traefik.http.routers.{}.tls.certresolver={}", name, CERT_RESOLVER),
        format!(
            "traefik.http.services.{}.loadbalancer.server.port={}",
            name, APP_INTERNAL_PORT
        ),
    ];

    // 请求/响应体大小限制通过路由级 buffering 中间件生效
    let web = &spec.web_advanced;
    if web.has_body_limits() {
        let middleware = format!("{}-buffering", name);
        if let Some(max) = web.max_request_body_bytes {
            labels.push(format!(
                "traefik.http.middlewares.{}.buffering.maxRequestBodyBytes={}",
                middleware, max
            ));
        }
        if let Some(max) = web.max_response_body_bytes {
            labels.push(format!(
                "traefik.http.middlewares.{}.buffering.maxResponseBodyBytes={}",
                middleware, max
            ));
        }
        labels.push(format!("traefik.http.routers.{}.middlewares={}", name, middleware));
    }

    labels
}

/// 新容器启动命令
pub fn run_command(spec: &DeploymentSpec, env_staged: bool) -> RemoteCommand {
    let mut cmd = RemoteCommand::new("docker")
        .args(["run", "-d", "--restart", "always", "--name"])
        .arg(&spec.name)
        .arg("-v")
        .arg(format!("{}:/data", app_data_dir(&spec.name)));

    for volume in &spec.volumes {
        cmd = cmd.arg("-v").arg(&volume.spec);
    }

    if env_staged {
        cmd = cmd.arg("--env-file").arg(app_env_file(&spec.name));
    }

    if spec.web {
        for label in router_labels(spec) {
            cmd = cmd.arg("--label").arg(label);
        }
        cmd = cmd.args(["--network", PROXY_NAME]);
    }

    cmd.arg(spec.image_ref())
}

/// 主机上是否存在同名容器（任意状态）
pub async fn exists(shell: &dyn RemoteShell, name: &str) -> Result<bool> {
    let output = shell
        .run_silent(
            &RemoteCommand::new("docker")
                .args(["ps", "-a", "--filter"])
                .arg(name_filter(name))
                .args(["--format", "{{.Names}}"]),
        )
        .await?;
    Ok(output.stdout.lines().any(|l| l.trim() == name))
}

/// 停止并删除同名容器，返回是否删除了容器
///
/// 已停止的容器不视为错误
pub async fn teardown(shell: &dyn RemoteShell, name: &str) -> Result<bool> {
    if !exists(shell, name).await? {
        println!("no existing container named {}", name);
        return Ok(false);
    }

    println!("stopping and deleting container {}", name);
    shell
        .run(&RemoteCommand::new("docker").arg("stop").arg(name).tolerate_failure())
        .await?;
    shell
        .run(&RemoteCommand::new("docker").args(["rm", "--force", name]))
        .await?;

    info!(container = %name, "Container removed");
    Ok(true)
}

/// 启动新容器
///
/// 旧容器已被删除时启动失败会以 `LaunchAfterTeardown` 报告，不尝试回滚
pub async fn launch(shell: &dyn RemoteShell, spec: &DeploymentSpec, env_staged: bool, replaced: bool) -> Result<()> {
    println!("running container {}", spec.name);

    match shell.run(&run_command(spec, env_staged)).await {
        Ok(_) => {
            info!(container = %spec.name, image = %spec.image_ref(), "Container started");
            Ok(())
        }
        Err(e) if replaced => {
            warn!(container = %spec.name, error = %e, "Replacement container failed to start");
            Err(HostctlError::LaunchAfterTeardown {
                container: spec.name.clone(),
                source: Box::new(e),
            })
        }
        Err(e) => Err(e),
    }
}

/// 容器状态 (`docker ps --filter`)
pub async fn status(shell: &dyn RemoteShell, name: &str) -> Result<String> {
    println!("getting container status");
    // 输出由调用方打印，这里不回显
    let output = shell
        .run_silent(
            &RemoteCommand::new("docker")
                .args(["ps", "-a", "--filter"])
                .arg(name_filter(name)),
        )
        .await?;
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deploy::{VolumeMount, WebAdvancedConfig};
    use crate::services::ssh::mock::RecordingShell;
    use crate::services::ssh::Echo;

    fn spec(web: bool) -> DeploymentSpec {
        DeploymentSpec {
            name: "alpha".to_string(),
            registry: Some("registry.example.com".to_string()),
            web,
            hostname: web.then(|| "alpha.example.com".to_string()),
            email: "ops@example.com".to_string(),
            volumes: vec![VolumeMount::parse("/srv/alpha/uploads:/app/uploads").unwrap()],
            environment_file: None,
            auth_file: None,
            platform: "linux/amd64".to_string(),
            build_arg_file: None,
            web_advanced: WebAdvancedConfig::default(),
        }
    }

    #[test]
    fn test_run_command_plain() {
        assert_eq!(
            run_command(&spec(false), true).render(),
            "docker run -d --restart always --name alpha -v /var/alpha:/data \
             -v /srv/alpha/uploads:/app/uploads --env-file /etc/alpha/alpha.env \
             registry.example.com/alpha:latest"
        );
    }

    #[test]
    fn test_run_command_web_labels() {
        let rendered = run_command(&spec(true), false).render();
        assert!(rendered.contains("--label traefik.enable=true"));
        assert!(rendered.contains(
            "--label 'traefik.http.routers.alpha.rule=Host(`alpha.example.com`) || Host(`www.alpha.example.com`)'"
        ));
        assert!(rendered.contains("traefik.http.routers.alpha.tls.certresolver=letsencrypt"));
        assert!(rendered.contains("--network traefik registry.example.com/alpha:latest"));
        assert!(!rendered.contains("--env-file"));
    }

    #[test]
    fn test_body_limit_labels() {
        let mut spec = spec(true);
        spec.web_advanced.max_request_body_bytes = Some(10_485_760);
        let labels = router_labels(&spec);
        assert!(labels.contains(
            &"traefik.http.middlewares.alpha-buffering.buffering.maxRequestBodyBytes=10485760".to_string()
        ));
        assert!(labels.contains(&"traefik.http.routers.alpha.middlewares=alpha-buffering".to_string()));
        assert!(!labels.iter().any(|l| l.contains("maxResponseBodyBytes")));
    }

    #[tokio::test]
    async fn test_teardown_absent_container() {
        let shell = RecordingShell::new();
        assert!(!teardown(&shell, "alpha").await.unwrap());
        assert!(!shell.ran("docker rm"));
    }

    #[tokio::test]
    async fn test_teardown_tolerates_stopped() {
        let shell = RecordingShell::new().respond("docker ps -a", "alpha\n");
        assert!(teardown(&shell, "alpha").await.unwrap());
        let commands = shell.commands();
        assert_eq!(commands[1], "docker stop alpha || true");
        assert_eq!(commands[2], "docker rm --force alpha");
    }

    #[tokio::test]
    async fn test_launch_after_teardown_error() {
        let shell = RecordingShell::new().fail("docker run", 125, "port is already allocated");
        let err = launch(&shell, &spec(false), false, true).await.unwrap_err();
        match err {
            HostctlError::LaunchAfterTeardown { container, source } => {
                assert_eq!(container, "alpha");
                assert!(source.to_string().contains("port is already allocated"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // 没有旧容器被删除时保持原始错误
        let err = launch(&shell, &spec(false), false, false).await.unwrap_err();
        assert!(matches!(err, HostctlError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_status_is_printed_once() {
        let row = "CONTAINER ID   IMAGE   STATUS\nabc123   registry.example.com/alpha:latest   Up 2 hours\n";
        let shell = RecordingShell::new().respond("docker ps -a --filter", row);
        assert_eq!(status(&shell, "alpha").await.unwrap(), row);
        assert_eq!(shell.echo_of("docker ps -a --filter"), Some(Echo::Silent));
    }
}

//! 项目配置文件 (`hostctl.yml` / `<env>.hostctl.yml`)

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::config::env::{discover_ssh_key, expand_home, EnvOverrides};
use crate::domain::deploy::{DeploymentSpec, VolumeMount, WebAdvancedConfig};
use crate::domain::proxy::Timeout;
use crate::domain::registry::normalize_registry;
use crate::domain::ssh::{RemoteTarget, DEFAULT_SSH_PORT, DEFAULT_SSH_USER};
use crate::error::{HostctlError, Result};

/// 默认配置文件名
pub const PROJECT_FILE: &str = "hostctl.yml";

/// `init` 写入的初始配置
pub const INIT_TEMPLATE: &str = "\
name: myapp
registry: registry.example.com/me
email: admin@example.com
server: 0.0.0.0
# user: root
# port: 22
# ssh_key: ~/.ssh/id_ed25519
# web: true
# hostname: myapp.example.com
# volumes:
#   - /srv/myapp/uploads:/app/uploads
# environment_file: .env.production
# web_advanced:
#   read_timeout: 60
#   write_timeout: 60
#   idle_timeout: 180
";

/// 配置文件的原始结构
#[derive(Clone, Debug, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    pub registry: Option<String>,
    #[serde(default = "default_email")]
    pub email: String,
    pub auth_file: Option<String>,
    pub server: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub ssh_key: Option<String>,
    #[serde(default = "default_platform")]
    pub platform: String,
    /// 多阶段构建目标
    pub target: Option<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    pub hostname: Option<String>,
    #[serde(default)]
    pub web: bool,
    pub environment_file: Option<String>,
    pub build_arg_file: Option<String>,
    #[serde(default)]
    pub web_advanced: WebAdvancedSection,
}

/// `web_advanced` 段：秒数，-1 或缺省表示未设置，0 表示不限
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebAdvancedSection {
    pub read_timeout: Option<i64>,
    pub write_timeout: Option<i64>,
    pub idle_timeout: Option<i64>,
    pub max_request_body_bytes: Option<u64>,
    pub max_response_body_bytes: Option<u64>,
}

fn default_email() -> String {
    "admin@localhost".to_string()
}

fn default_platform() -> String {
    "linux/amd64".to_string()
}

/// 加载后的项目配置
#[derive(Clone, Debug)]
pub struct ProjectConfig {
    /// 配置文件所在目录（本地构建的工作目录）
    pub work_dir: PathBuf,
    pub target: RemoteTarget,
    pub spec: DeploymentSpec,
    /// 多阶段构建目标
    pub build_target: Option<String>,
}

/// 根据环境名得到配置文件名
pub fn project_file_name(env_name: Option<&str>) -> String {
    match env_name {
        Some(env) if !env.is_empty() => format!("{}.{}", env, PROJECT_FILE),
        _ => PROJECT_FILE.to_string(),
    }
}

impl ProjectFile {
    /// 解析 YAML 内容
    pub fn parse(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| HostctlError::config(e.to_string()))
    }

    /// 读取并解析配置文件
    pub async fn read(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HostctlError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    /// 转换为不可变的 (RemoteTarget, DeploymentSpec)
    ///
    /// 卷声明在这里校验，保证格式错误在任何远程操作之前失败
    pub fn resolve(self, overrides: &EnvOverrides) -> Result<(RemoteTarget, DeploymentSpec)> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(HostctlError::config("`name` must not be empty"));
        }

        let host = overrides
            .server
            .clone()
            .or(self.server)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| HostctlError::config("`server` must be set"))?;

        let user = overrides
            .ssh_user
            .clone()
            .or(self.user)
            .unwrap_or_else(|| DEFAULT_SSH_USER.to_string());
        let port = overrides.ssh_port.or(self.port).unwrap_or(DEFAULT_SSH_PORT);

        let key_path = match overrides.ssh_key.clone().or(self.ssh_key) {
            Some(key) => expand_home(&key),
            None => discover_ssh_key()?,
        };

        let target = RemoteTarget::new(host, user, key_path).with_port(port);

        let volumes = self
            .volumes
            .iter()
            .map(|v| VolumeMount::parse(v))
            .collect::<Result<Vec<_>>>()?;

        if self.web && self.hostname.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err(HostctlError::config("`hostname` is required when `web` is true"));
        }

        let web_advanced = WebAdvancedConfig {
            read_timeout: timeout(self.web_advanced.read_timeout),
            write_timeout: timeout(self.web_advanced.write_timeout),
            idle_timeout: timeout(self.web_advanced.idle_timeout),
            max_request_body_bytes: self.web_advanced.max_request_body_bytes,
            max_response_body_bytes: self.web_advanced.max_response_body_bytes,
        };

        let spec = DeploymentSpec {
            name,
            registry: self
                .registry
                .as_deref()
                .map(normalize_registry)
                .filter(|r| !r.is_empty()),
            web: self.web,
            hostname: self.hostname,
            email: self.email,
            volumes,
            environment_file: self.environment_file,
            auth_file: self.auth_file,
            platform: self.platform,
            build_arg_file: self.build_arg_file,
            web_advanced,
        };

        Ok((target, spec))
    }
}

fn timeout(secs: Option<i64>) -> Timeout {
    secs.map(Timeout::from_secs).unwrap_or_default()
}

impl ProjectConfig {
    /// 从目录加载配置文件
    pub async fn load(dir: &Path, env_name: Option<&str>, overrides: &EnvOverrides) -> Result<Self> {
        let path = dir.join(project_file_name(env_name));
        let file = ProjectFile::read(&path).await?;
        let build_target = file.target.clone().filter(|t| !t.is_empty());
        let (target, spec) = file.resolve(overrides)?;

        info!(config = %path.display(), app = %spec.name, server = %target, "Config loaded");

        Ok(Self {
            work_dir: dir.to_path_buf(),
            target,
            spec,
            build_target,
        })
    }
}

/// 写入初始配置；已存在时返回 false
pub async fn init_project(dir: &Path) -> Result<bool> {
    let path = dir.join(PROJECT_FILE);
    if tokio::fs::try_exists(&path).await? {
        return Ok(false);
    }
    tokio::fs::write(&path, INIT_TEMPLATE).await?;
    Ok(true)
}

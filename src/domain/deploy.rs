//! 部署相关领域模型

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::proxy::Timeout;
use crate::error::{HostctlError, Result};

/// 应用配置目录 (`/etc/<name>`)
pub fn app_config_dir(name: &str) -> String {
    format!("/etc/{}", name)
}

/// 应用数据目录 (`/var/<name>`)，挂载到容器内的 `/data`
pub fn app_data_dir(name: &str) -> String {
    format!("/var/{}", name)
}

/// 应用环境变量文件在主机上的路径
pub fn app_env_file(name: &str) -> String {
    format!("/etc/{}/{}.env", name, name)
}

/// 卷挂载 (`host:container[:opts]`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    /// 原始声明，原样传给 `docker run -v`
    pub spec: String,
}

impl VolumeMount {
    /// 解析卷声明，缺少分隔符时返回错误
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.splitn(3, ':');
        let host_path = parts.next().unwrap_or_default().trim();
        let container_path = parts.next().unwrap_or_default().trim();
        if host_path.is_empty() || container_path.is_empty() {
            return Err(HostctlError::MalformedVolume(spec.to_string()));
        }
        Ok(Self {
            host_path: host_path.to_string(),
            container_path: container_path.to_string(),
            spec: spec.to_string(),
        })
    }
}

/// Web 高级配置：超时与请求/响应体大小限制
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WebAdvancedConfig {
    pub read_timeout: Timeout,
    pub write_timeout: Timeout,
    pub idle_timeout: Timeout,
    pub max_request_body_bytes: Option<u64>,
    pub max_response_body_bytes: Option<u64>,
}

impl WebAdvancedConfig {
    /// 是否声明了任一超时
    pub fn has_timeouts(&self) -> bool {
        !(self.read_timeout.is_unset() && self.write_timeout.is_unset() && self.idle_timeout.is_unset())
    }

    /// 是否声明了任一体积限制
    pub fn has_body_limits(&self) -> bool {
        self.max_request_body_bytes.is_some() || self.max_response_body_bytes.is_some()
    }
}

/// 部署描述（每次调用构造一次，只读）
#[derive(Clone, Debug)]
pub struct DeploymentSpec {
    /// 容器名称，主机上唯一
    pub name: String,
    /// 镜像仓库（为空时使用直接部署模式）
    pub registry: Option<String>,
    /// 是否作为 Web 服务接入反向代理
    pub web: bool,
    /// 路由主机名
    pub hostname: Option<String>,
    /// ACME 联系邮箱
    pub email: String,
    /// 已校验的卷挂载
    pub volumes: Vec<VolumeMount>,
    /// 本地环境变量文件
    pub environment_file: Option<String>,
    /// 预先生成的仓库认证文件
    pub auth_file: Option<String>,
    /// 构建平台
    pub platform: String,
    /// 构建参数文件
    pub build_arg_file: Option<String>,
    pub web_advanced: WebAdvancedConfig,
}

impl DeploymentSpec {
    /// 主机上使用的镜像引用
    pub fn image_ref(&self) -> String {
        match self.registry {
            Some(ref registry) => format!("{}/{}:latest", registry.trim_end_matches('/'), self.name),
            None => format!("{}:latest", self.name),
        }
    }

    /// 直接部署模式（无镜像仓库）
    pub fn is_direct(&self) -> bool {
        self.registry.is_none()
    }

    /// 直接部署使用的本地压缩镜像包
    pub fn image_archive_name(&self) -> String {
        format!("{}.tar.gz", self.name)
    }

    /// 镜像包在主机上的临时路径
    pub fn remote_archive_path(&self) -> String {
        format!("/tmp/{}", self.image_archive_name())
    }
}

/// 部署任务状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Running,
    Success,
    Failed,
}

impl DeployStatus {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 阶段状态
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    /// 阶段摘要使用的图标
    pub fn icon(&self) -> &'static str {
        match self {
            StageStatus::Success => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
            StageStatus::Running => "⟳",
            StageStatus::Pending => "○",
        }
    }
}

/// 部署阶段信息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeployStage {
    /// 阶段标识 (e.g., "stage_host", "pull_image", "launch")
    pub name: String,
    /// 显示名称
    pub display_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 持续时间（毫秒）
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    /// 附加信息
    pub message: Option<String>,
}

impl DeployStage {
    /// 创建新的待执行阶段
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    /// 开始执行阶段
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    /// 完成阶段
    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    /// 跳过阶段
    pub fn skip(&mut self, message: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = message;
    }

    /// 摘要行
    pub fn summary_line(&self) -> String {
        let duration = self
            .duration_ms
            .map(|d| format!("{}ms", d))
            .unwrap_or_else(|| "-".to_string());
        match self.message {
            Some(ref msg) => format!("{} {} ({}) - {}", self.status.icon(), self.display_name, duration, msg),
            None => format!("{} {} ({})", self.status.icon(), self.display_name, duration),
        }
    }
}

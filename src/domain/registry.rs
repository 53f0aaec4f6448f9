//! 镜像仓库分类
//!
//! 分类只依赖 URL 字符串本身；未知提供商必须失败关闭，不尝试登录

use std::fmt;

use crate::error::{HostctlError, Result};

/// ECR 根域名标签
const AWS_ROOT_LABEL: &str = "amazonaws";

/// 镜像仓库提供商
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryClass {
    /// AWS ECR (`<account>.dkr.ecr.<region>.amazonaws.com`)
    Ecr,
    /// DigitalOcean (`registry.digitalocean.com`)
    DigitalOcean,
    Unsupported,
}

impl RegistryClass {
    /// 根据仓库 URL 分类
    ///
    /// 每个分支检查互斥的主机名后缀，因此分支顺序不影响结果
    pub fn classify(registry_url: &str) -> Self {
        let host = registry_host(registry_url).to_lowercase();
        let labels: Vec<&str> = host.split('.').collect();

        let is_ecr = host.ends_with(".amazonaws.com") && labels.contains(&"ecr");
        let is_do = host == "registry.digitalocean.com" || host.ends_with(".digitaloceanspaces.com");

        match (is_ecr, is_do) {
            (true, false) => RegistryClass::Ecr,
            (false, true) => RegistryClass::DigitalOcean,
            _ => RegistryClass::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryClass::Ecr => "ecr",
            RegistryClass::DigitalOcean => "digitalocean",
            RegistryClass::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for RegistryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 镜像引用使用的仓库前缀：去掉协议与结尾的 `/`，保留路径
pub fn normalize_registry(registry_url: &str) -> String {
    let trimmed = registry_url.trim();
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// 去掉协议与路径，只保留主机名（含端口时去掉端口）
pub fn registry_host(registry_url: &str) -> &str {
    let without_scheme = registry_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(registry_url);
    let host = without_scheme.split('/').next().unwrap_or_default();
    host.split(':').next().unwrap_or_default()
}

/// 从 ECR URL 中提取区域：根域名标签 `amazonaws` 前面的那一段
pub fn ecr_region(registry_url: &str) -> Result<String> {
    let host = registry_host(registry_url);
    let labels: Vec<&str> = host.split('.').collect();

    let root = labels
        .iter()
        .position(|l| l.eq_ignore_ascii_case(AWS_ROOT_LABEL))
        .ok_or_else(|| HostctlError::MalformedRegistryUrl(registry_url.to_string()))?;

    match root.checked_sub(1).map(|i| labels[i]) {
        Some(region) if !region.is_empty() && !region.eq_ignore_ascii_case("ecr") => Ok(region.to_string()),
        _ => Err(HostctlError::MalformedRegistryUrl(registry_url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            RegistryClass::classify("123456789012.dkr.ecr.us-east-1.amazonaws.com/team"),
            RegistryClass::Ecr
        );
        assert_eq!(
            RegistryClass::classify("https://123456789012.dkr.ecr.eu-west-2.amazonaws.com"),
            RegistryClass::Ecr
        );
        assert_eq!(
            RegistryClass::classify("registry.digitalocean.com/my-team"),
            RegistryClass::DigitalOcean
        );
        assert_eq!(
            RegistryClass::classify("bucket.nyc3.digitaloceanspaces.com"),
            RegistryClass::DigitalOcean
        );
        assert_eq!(RegistryClass::classify("ghcr.io/me"), RegistryClass::Unsupported);
        assert_eq!(RegistryClass::classify("registry.example.com"), RegistryClass::Unsupported);
        assert_eq!(RegistryClass::classify(""), RegistryClass::Unsupported);
    }

    #[test]
    fn test_classify_ignores_lookalike_paths() {
        // 提供商域名出现在路径中不算
        assert_eq!(
            RegistryClass::classify("registry.example.com/amazonaws.com/ecr"),
            RegistryClass::Unsupported
        );
        assert_eq!(
            RegistryClass::classify("evil.com/registry.digitalocean.com"),
            RegistryClass::Unsupported
        );
        // S3 不是 ECR
        assert_eq!(RegistryClass::classify("s3.us-east-1.amazonaws.com"), RegistryClass::Unsupported);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let url = "123456789012.dkr.ecr.ap-south-1.amazonaws.com/app";
        assert_eq!(RegistryClass::classify(url), RegistryClass::classify(url));
    }

    #[test]
    fn test_ecr_region() {
        assert_eq!(
            ecr_region("123456789012.dkr.ecr.us-east-1.amazonaws.com/team").unwrap(),
            "us-east-1"
        );
        assert_eq!(
            ecr_region("https://1.dkr.ecr.eu-central-1.amazonaws.com:443/x").unwrap(),
            "eu-central-1"
        );
    }

    #[test]
    fn test_ecr_region_malformed() {
        assert!(matches!(
            ecr_region("registry.digitalocean.com/team"),
            Err(HostctlError::MalformedRegistryUrl(_))
        ));
        assert!(ecr_region("amazonaws.com").is_err());
        assert!(ecr_region("1.dkr.ecr.amazonaws.com").is_err());
    }

    #[test]
    fn test_normalize_registry() {
        assert_eq!(normalize_registry("https://registry.example.com/"), "registry.example.com");
        assert_eq!(normalize_registry("http://host:5000/team"), "host:5000/team");
        assert_eq!(
            normalize_registry("registry.digitalocean.com/team"),
            "registry.digitalocean.com/team"
        );
    }

    #[test]
    fn test_registry_host() {
        assert_eq!(registry_host("https://host.example.com:5000/a/b"), "host.example.com");
        assert_eq!(registry_host("host.example.com"), "host.example.com");
    }
}

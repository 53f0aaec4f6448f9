//! 主机操作系统分类

use std::fmt;

/// 主机操作系统家族，决定使用哪套包管理命令
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostOsClass {
    /// ubuntu / debian (apt)
    Debian,
    /// Amazon Linux (dnf)
    AmazonLinux,
    /// rhel / centos / rocky / alma / fedora (yum)
    Rhel,
}

impl HostOsClass {
    /// 按 os-release 中的 ID 分类
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().trim_matches('"').to_lowercase().as_str() {
            "ubuntu" | "debian" => Some(HostOsClass::Debian),
            "amzn" => Some(HostOsClass::AmazonLinux),
            "rhel" | "centos" | "rocky" | "almalinux" | "fedora" => Some(HostOsClass::Rhel),
            _ => None,
        }
    }

    /// 解析 `/etc/os-release` 内容：先看 `ID`，再看 `ID_LIKE`
    pub fn from_os_release(contents: &str) -> Option<Self> {
        let field = |key: &str| {
            contents.lines().find_map(|line| {
                let (k, v) = line.split_once('=')?;
                (k.trim() == key).then(|| v.trim().trim_matches('"').trim_matches('\'').to_string())
            })
        };

        if let Some(class) = field("ID").as_deref().and_then(Self::from_id) {
            return Some(class);
        }

        field("ID_LIKE")?
            .split_whitespace()
            .find_map(Self::from_id)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostOsClass::Debian => "debian-family",
            HostOsClass::AmazonLinux => "amazon-linux",
            HostOsClass::Rhel => "rhel-family",
        }
    }
}

impl fmt::Display for HostOsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 当 os-release 无法识别时按顺序检查的标记文件
pub const OS_MARKER_FILES: [(&str, HostOsClass); 3] = [
    ("/etc/amazon-linux-release", HostOsClass::AmazonLinux),
    ("/etc/debian_version", HostOsClass::Debian),
    ("/etc/redhat-release", HostOsClass::Rhel),
];

//! 反向代理 (Traefik) 静态配置文档
//!
//! 文档从主机读取、在内存中合并、再写回。未建模的字段通过 `extra` 保留，
//! 读取 → 合并 → 写回的过程中不会丢失。
//!
//! 超时合并是单调的：新值未设置时不改变现有值；0（无限制）总是胜出且不会被降级；
//! 两个有限值取较大者。共享同一代理的多个应用因此不会互相缩短超时。

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use crate::domain::deploy::WebAdvancedConfig;
use crate::error::Result;

/// HTTP 入口名称
pub const ENTRY_POINT_WEB: &str = "web";
/// HTTPS 入口名称，超时设置挂在这里
pub const ENTRY_POINT_WEBSECURE: &str = "websecure";
/// 证书解析器名称
pub const CERT_RESOLVER: &str = "letsencrypt";
/// 证书存储在代理容器内的路径
pub const ACME_STORAGE: &str = "acme.json";

/// 超时取值
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Timeout {
    /// 未设置
    #[default]
    Unset,
    /// 0，无限制
    Unlimited,
    /// 正数秒
    Seconds(u64),
}

impl Timeout {
    /// 从配置中的整数秒构造：负数为未设置，0 为无限制
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            s if s < 0 => Timeout::Unset,
            0 => Timeout::Unlimited,
            s => Timeout::Seconds(s as u64),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Timeout::Unset)
    }

    /// 解析 Traefik 时长字符串（如 `60s`、`2m`、`1h30m`、`0`）
    ///
    /// 空字符串为未设置；无法解析时返回 `None`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Some(Timeout::Unset);
        }

        let mut total: u64 = 0;
        let mut digits = String::new();
        for c in s.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            let n: u64 = digits.parse().ok()?;
            digits.clear();
            let mul = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                _ => return None,
            };
            total = total.checked_add(n.checked_mul(mul)?)?;
        }
        if !digits.is_empty() {
            // 无单位的整数按秒处理
            total = total.checked_add(digits.parse().ok()?)?;
        }

        Some(if total == 0 {
            Timeout::Unlimited
        } else {
            Timeout::Seconds(total)
        })
    }

    /// 渲染为文档中的字符串，未设置时为 `None`
    pub fn render(&self) -> Option<String> {
        match self {
            Timeout::Unset => None,
            Timeout::Unlimited => Some("0s".to_string()),
            Timeout::Seconds(n) => Some(format!("{}s", n)),
        }
    }

    /// 单调合并
    pub fn merge(self, new: Timeout) -> Timeout {
        match (self, new) {
            (existing, Timeout::Unset) => existing,
            (Timeout::Unlimited, _) | (_, Timeout::Unlimited) => Timeout::Unlimited,
            (Timeout::Unset, n) => n,
            (Timeout::Seconds(a), Timeout::Seconds(b)) => Timeout::Seconds(a.max(b)),
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(s) => f.write_str(&s),
            None => f.write_str("unset"),
        }
    }
}

/// 代理静态配置文档
///
/// 文档中不存在的字段保持不存在，写回时不会补出默认值
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyDocument {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entry_points: BTreeMap<String, EntryPoint>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub certificates_resolvers: BTreeMap<String, CertificateResolver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Providers>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<EntryPointTransport>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPointTransport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responding_timeouts: Option<RespondingTimeouts>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondingTimeouts {
    #[serde(default, deserialize_with = "de_duration", skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<String>,
    #[serde(default, deserialize_with = "de_duration", skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<String>,
    #[serde(default, deserialize_with = "de_duration", skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// 非 ACME 的解析器（如 tailscale）只有 `extra`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateResolver {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acme: Option<AcmeConfig>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcmeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_challenge: Option<HttpChallenge>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpChallenge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Providers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerProvider>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// `exposedByDefault` 缺省时 Traefik 按 `true` 处理，因此不能补值
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerProvider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_by_default: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EntryPoint {
    fn listening_on(address: &str) -> Self {
        Self {
            address: Some(address.to_string()),
            ..Default::default()
        }
    }
}

impl ProxyDocument {
    /// 为新主机生成配置
    pub fn fresh(email: &str, web: &WebAdvancedConfig) -> Self {
        let mut entry_points = BTreeMap::new();
        entry_points.insert(ENTRY_POINT_WEB.to_string(), EntryPoint::listening_on(":80"));

        let mut websecure = EntryPoint::listening_on(":443");
        if web.has_timeouts() {
            websecure.transport = Some(EntryPointTransport {
                responding_timeouts: Some(RespondingTimeouts {
                    read_timeout: web.read_timeout.render(),
                    write_timeout: web.write_timeout.render(),
                    idle_timeout: web.idle_timeout.render(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        entry_points.insert(ENTRY_POINT_WEBSECURE.to_string(), websecure);

        let mut certificates_resolvers = BTreeMap::new();
        certificates_resolvers.insert(
            CERT_RESOLVER.to_string(),
            CertificateResolver {
                acme: Some(AcmeConfig {
                    email: Some(email.to_string()),
                    storage: Some(ACME_STORAGE.to_string()),
                    http_challenge: Some(HttpChallenge {
                        entry_point: Some(ENTRY_POINT_WEB.to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        Self {
            entry_points,
            certificates_resolvers,
            providers: Some(Providers {
                docker: Some(DockerProvider {
                    exposed_by_default: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            extra: BTreeMap::new(),
        }
    }

    /// 解析文档，空文档视为默认值
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// 序列化为 YAML
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// 将新超时单调合并到 `websecure` 入口，返回文档是否改变
    ///
    /// 文档没有 `websecure` 入口时不做任何修改；现有值无法解析时保持原样
    pub fn merge_timeouts(&mut self, web: &WebAdvancedConfig) -> bool {
        let Some(websecure) = self.entry_points.get_mut(ENTRY_POINT_WEBSECURE) else {
            return false;
        };
        if !web.has_timeouts() {
            return false;
        }

        let mut timeouts = websecure
            .transport
            .as_ref()
            .and_then(|t| t.responding_timeouts.clone())
            .unwrap_or_default();

        let mut changed = false;
        changed |= merge_field(&mut timeouts.read_timeout, web.read_timeout, "readTimeout");
        changed |= merge_field(&mut timeouts.write_timeout, web.write_timeout, "writeTimeout");
        changed |= merge_field(&mut timeouts.idle_timeout, web.idle_timeout, "idleTimeout");
        if changed {
            // 只有值变化时才创建 transport / respondingTimeouts
            let transport = websecure.transport.get_or_insert_with(Default::default);
            transport.responding_timeouts = Some(timeouts);
        }
        changed
    }
}

/// 时长既可以是字符串 (`60s`) 也可以是裸数字 (`60`)
fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("invalid duration: {:?}", other))),
    }
}

fn merge_field(slot: &mut Option<String>, new: Timeout, field: &str) -> bool {
    let current = slot.as_deref().unwrap_or("");
    let Some(existing) = Timeout::parse(current) else {
        tracing::warn!(field, value = %current, "Unparseable proxy timeout, leaving it unchanged");
        return false;
    };

    let merged = existing.merge(new);
    if merged == existing {
        return false;
    }
    *slot = merged.render();
    true
}

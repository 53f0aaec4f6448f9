//! 主机资源快照领域模型（monitor 命令使用，只读）

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 主机资源快照
#[derive(Clone, Debug, Serialize)]
pub struct HostSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_count: usize,
    pub load_average: LoadAverage,
    /// 两次 `/proc/stat` 采样之间的 CPU 使用率
    pub cpu_usage_percent: f64,
    pub memory: MemoryInfo,
    pub root_disk: DiskInfo,
    /// 没有默认路由或计数器不可读时为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,
    pub containers: ContainerCounts,
}

/// 系统负载平均值 (1, 5, 15 分钟)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

impl LoadAverage {
    pub fn new(one: f64, five: f64, fifteen: f64) -> Self {
        Self { one, five, fifteen }
    }

    /// 解析 `/proc/loadavg`
    pub fn parse(contents: &str) -> Option<Self> {
        let mut fields = contents.split_whitespace().map(|f| f.parse::<f64>());
        let one = fields.next()?.ok()?;
        let five = fields.next()?.ok()?;
        let fifteen = fields.next()?.ok()?;
        Some(Self::new(one, five, fifteen))
    }
}

/// `/proc/stat` 中汇总 `cpu` 行的累计节拍
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuTimes {
    /// idle + iowait
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// 解析 `/proc/stat`
    pub fn parse(contents: &str) -> Option<Self> {
        let line = contents.lines().find(|l| l.starts_with("cpu "))?;
        let ticks = line
            .split_whitespace()
            .skip(1)
            .map(|f| f.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .ok()?;
        if ticks.len() < 4 {
            return None;
        }
        Some(Self {
            idle: ticks[3] + ticks.get(4).copied().unwrap_or(0),
            total: ticks.iter().sum(),
        })
    }

    /// 相对较早一次采样的使用率
    pub fn usage_since(&self, earlier: &CpuTimes) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        let idle = self.idle.saturating_sub(earlier.idle);
        percent(total.saturating_sub(idle), total)
    }
}

/// 默认路由所在的网卡（`/proc/net/route` 中目标为 `00000000` 的行）
pub fn default_interface(route: &str) -> Option<String> {
    route.lines().skip(1).find_map(|line| {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        (fields.next()? == "00000000").then(|| iface.to_string())
    })
}

/// 网卡累计收发字节数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl NetCounters {
    /// 从 `/proc/net/dev` 中取出指定网卡的计数器
    pub fn parse(contents: &str, iface: &str) -> Option<Self> {
        contents.lines().find_map(|line| {
            let (name, counters) = line.split_once(':')?;
            if name.trim() != iface {
                return None;
            }
            let fields: Vec<&str> = counters.split_whitespace().collect();
            if fields.len() < 9 {
                return None;
            }
            Some(Self {
                rx_bytes: fields[0].parse().ok()?,
                tx_bytes: fields[8].parse().ok()?,
            })
        })
    }
}

/// 默认网卡的收发速率
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetworkInfo {
    pub interface: String,
    pub rx_kb_per_sec: f64,
    pub tx_kb_per_sec: f64,
}

impl NetworkInfo {
    /// 由两次采样计算速率，计数器回绕时记为 0
    pub fn from_samples(interface: &str, first: NetCounters, second: NetCounters, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = |before: u64, after: u64| {
            if secs <= 0.0 {
                0.0
            } else {
                after.saturating_sub(before) as f64 / 1024.0 / secs
            }
        };
        Self {
            interface: interface.to_string(),
            rx_kb_per_sec: rate(first.rx_bytes, second.rx_bytes),
            tx_kb_per_sec: rate(first.tx_bytes, second.tx_bytes),
        }
    }
}

/// 内存信息
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryInfo {
    /// 解析 `/proc/meminfo`（单位 kB）
    pub fn parse(contents: &str) -> Option<Self> {
        let field = |key: &str| {
            contents.lines().find_map(|line| {
                let rest = line.strip_prefix(key)?.strip_prefix(':')?;
                rest.split_whitespace().next()?.parse::<u64>().ok()
            })
        };
        let total = field("MemTotal")?;
        let available = field("MemAvailable").or_else(|| field("MemFree"))?;
        Some(Self {
            total_bytes: total * 1024,
            available_bytes: available * 1024,
        })
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    pub fn usage_percent(&self) -> f64 {
        percent(self.used_bytes(), self.total_bytes)
    }
}

/// 磁盘信息
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiskInfo {
    pub mount_point: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

impl DiskInfo {
    /// 解析 `df -P -B1 <mount>` 输出（跳过表头）
    pub fn parse_df(output: &str) -> Option<Self> {
        let line = output.lines().skip(1).find(|l| !l.trim().is_empty())?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            return None;
        }
        Some(Self {
            mount_point: fields[5].to_string(),
            total_bytes: fields[1].parse().ok()?,
            used_bytes: fields[2].parse().ok()?,
            available_bytes: fields[3].parse().ok()?,
        })
    }

    pub fn usage_percent(&self) -> f64 {
        percent(self.used_bytes, self.total_bytes)
    }
}

/// 容器数量统计
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ContainerCounts {
    pub running: usize,
    pub total: usize,
}

impl ContainerCounts {
    /// 解析 `docker ps -a --format '{{.State}}'` 输出
    pub fn parse_states(output: &str) -> Self {
        output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .fold(Self::default(), |mut acc, state| {
                acc.total += 1;
                if state == "running" {
                    acc.running += 1;
                }
                acc
            })
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// 以 GiB 显示
pub fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

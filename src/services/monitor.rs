//! 主机资源快照（只读）

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::env::constants::MONITOR_SAMPLE_INTERVAL;
use crate::domain::system::{
    default_interface, gib, ContainerCounts, CpuTimes, DiskInfo, HostSnapshot, LoadAverage, MemoryInfo,
    NetCounters, NetworkInfo,
};
use crate::error::{HostctlError, Result};
use crate::infra::RemoteCommand;
use crate::services::ssh::{ExecOptions, RemoteShell};

fn unexpected(cmd: &RemoteCommand, output: &str) -> HostctlError {
    HostctlError::UnexpectedOutput {
        command: cmd.render(),
        output: output.trim().to_string(),
    }
}

async fn read_parsed<T>(
    shell: &dyn RemoteShell,
    cmd: RemoteCommand,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T> {
    let output = shell.run_silent(&cmd).await?;
    parse(&output.stdout).ok_or_else(|| unexpected(&cmd, &output.stdout))
}

/// 一次计数器采样
struct Sample {
    cpu: CpuTimes,
    net: Option<NetCounters>,
    at: Instant,
}

async fn sample(shell: &dyn RemoteShell, iface: Option<&str>) -> Result<Sample> {
    let cpu = read_parsed(shell, RemoteCommand::new("cat").arg("/proc/stat"), CpuTimes::parse).await?;
    let net = match iface {
        Some(iface) => {
            let output = shell
                .run_silent(&RemoteCommand::new("cat").arg("/proc/net/dev"))
                .await?;
            NetCounters::parse(&output.stdout, iface)
        }
        None => None,
    };
    Ok(Sample {
        cpu,
        net,
        at: Instant::now(),
    })
}

/// 采集一次快照
pub async fn snapshot(shell: &dyn RemoteShell) -> Result<HostSnapshot> {
    snapshot_sampled(shell, MONITOR_SAMPLE_INTERVAL).await
}

/// CPU 使用率与网络速率取间隔 `interval` 的两次采样之差
async fn snapshot_sampled(shell: &dyn RemoteShell, interval: Duration) -> Result<HostSnapshot> {
    let cpu_count = read_parsed(shell, RemoteCommand::new("nproc"), |s| s.trim().parse().ok()).await?;
    let load_average = read_parsed(
        shell,
        RemoteCommand::new("cat").arg("/proc/loadavg"),
        LoadAverage::parse,
    )
    .await?;
    let memory = read_parsed(
        shell,
        RemoteCommand::new("cat").arg("/proc/meminfo"),
        MemoryInfo::parse,
    )
    .await?;
    let root_disk = read_parsed(
        shell,
        RemoteCommand::new("df").args(["-P", "-B1", "/"]),
        DiskInfo::parse_df,
    )
    .await?;

    // 网络是可选的，没有默认路由时跳过
    let route = shell
        .exec(&RemoteCommand::new("cat").arg("/proc/net/route"), &ExecOptions::silent())
        .await?;
    let iface = if route.success() {
        default_interface(&route.stdout)
    } else {
        None
    };
    if iface.is_none() {
        debug!("No default route, skipping network sampling");
    }

    let first = sample(shell, iface.as_deref()).await?;
    tokio::time::sleep(interval).await;
    let second = sample(shell, iface.as_deref()).await?;

    let cpu_usage_percent = second.cpu.usage_since(&first.cpu);
    let network = match (iface.as_deref(), first.net, second.net) {
        (Some(iface), Some(a), Some(b)) => Some(NetworkInfo::from_samples(
            iface,
            a,
            b,
            second.at.duration_since(first.at),
        )),
        _ => None,
    };

    // 运行时未安装时容器数为零
    let ps = RemoteCommand::new("docker").args(["ps", "-a", "--format", "{{.State}}"]);
    let output = shell.exec(&ps, &ExecOptions::silent()).await?;
    let containers = if output.success() {
        ContainerCounts::parse_states(&output.stdout)
    } else {
        warn!(status = output.status, "docker ps failed, reporting no containers");
        ContainerCounts::default()
    };

    Ok(HostSnapshot {
        timestamp: chrono::Utc::now(),
        cpu_count,
        load_average,
        cpu_usage_percent,
        memory,
        root_disk,
        network,
        containers,
    })
}

/// 终端显示
pub fn render_human(snap: &HostSnapshot) -> String {
    let load = &snap.load_average;
    let mem = &snap.memory;
    let disk = &snap.root_disk;
    let network = match &snap.network {
        Some(net) => format!(
            "\n  Network ({}): rx {:.1} KB/s, tx {:.1} KB/s",
            net.interface, net.rx_kb_per_sec, net.tx_kb_per_sec
        ),
        None => String::new(),
    };
    format!(
        "Host snapshot at {}\n\
         \x20 CPU:        {} cores, {:.1}% used, load {:.2} {:.2} {:.2}\n\
         \x20 Memory:     {:.2} / {:.2} GiB ({:.1}%)\n\
         \x20 Disk ({}):  {:.2} / {:.2} GiB ({:.1}%){}\n\
         \x20 Containers: {} running / {} total",
        snap.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        snap.cpu_count,
        snap.cpu_usage_percent,
        load.one,
        load.five,
        load.fifteen,
        gib(mem.used_bytes()),
        gib(mem.total_bytes),
        mem.usage_percent(),
        disk.mount_point,
        gib(disk.used_bytes),
        gib(disk.total_bytes),
        disk.usage_percent(),
        network,
        snap.containers.running,
        snap.containers.total,
    )
}

/// JSON 输出
pub fn render_json(snap: &HostSnapshot) -> Result<String> {
    serde_json::to_string_pretty(snap).map_err(|e| HostctlError::config(format!("cannot encode snapshot: {}", e)))
}

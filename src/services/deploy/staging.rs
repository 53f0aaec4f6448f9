//! 主机暂存：应用配置/数据目录、卷目录与环境变量文件

use std::path::Path;

use tracing::info;

use crate::domain::deploy::{app_config_dir, app_data_dir, app_env_file, DeploymentSpec};
use crate::error::Result;
use crate::infra::RemoteCommand;
use crate::services::ssh::RemoteShell;

/// 需要在主机上创建的目录
pub fn staging_commands(spec: &DeploymentSpec) -> Vec<RemoteCommand> {
    let mut dirs = vec![app_config_dir(&spec.name), app_data_dir(&spec.name)];
    dirs.extend(spec.volumes.iter().map(|v| v.host_path.clone()));

    dirs.into_iter()
        .map(|d| RemoteCommand::new("mkdir").arg("-p").arg(d))
        .collect()
}

/// 暂存主机，返回是否复制了环境变量文件
pub async fn stage_host(shell: &dyn RemoteShell, spec: &DeploymentSpec) -> Result<bool> {
    println!("creating volume mount and config directories");
    for cmd in staging_commands(spec) {
        shell.run(&cmd).await?;
    }

    let Some(ref env_file) = spec.environment_file else {
        return Ok(false);
    };

    println!("copying env file");
    let remote = app_env_file(&spec.name);
    shell.copy_to(Path::new(env_file), &remote).await?;
    shell.run_silent(&RemoteCommand::new("chmod").args(["600", remote.as_str()])).await?;

    info!(app = %spec.name, env_file = %env_file, "Environment file staged");
    Ok(true)
}

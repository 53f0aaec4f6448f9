//! Local image build
//!
//! Builds the application image on this machine, then either pushes it to the
//! registry or saves a compressed archive for direct deployment.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::domain::deploy::DeploymentSpec;
use crate::error::{HostctlError, Result};
use crate::infra::{shell_quote, CommandRunner};

/// Read `KEY=VALUE` build args, skipping blanks and `#` comments
pub fn parse_build_args(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| l.contains('='))
        .map(|l| l.strip_prefix("export ").unwrap_or(l).to_string())
        .collect()
}

/// Arguments for `docker build`
pub fn build_args(spec: &DeploymentSpec, target: Option<&str>, build_args: &[String]) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "--progress=plain".to_string(),
        "--platform".to_string(),
        spec.platform.clone(),
    ];
    if let Some(target) = target {
        args.push("--target".to_string());
        args.push(target.to_string());
    }
    for arg in build_args {
        args.push("--build-arg".to_string());
        args.push(arg.clone());
    }
    args.push("-t".to_string());
    args.push(spec.name.clone());
    args.push(".".to_string());
    args
}

/// Build the image and deliver it locally.
///
/// Returns the archive path for direct deployments, `None` when pushed.
pub async fn build_and_publish(work_dir: &Path, spec: &DeploymentSpec, target: Option<&str>) -> Result<Option<PathBuf>> {
    let extra = match spec.build_arg_file {
        Some(ref file) => {
            let path = work_dir.join(file);
            let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
                HostctlError::config(format!("cannot read build arg file {}: {}", path.display(), e))
            })?;
            parse_build_args(&contents)
        }
        None => Vec::new(),
    };

    println!("building container");
    let args = build_args(spec, target, &extra);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    CommandRunner::run_streaming("docker", &args, work_dir).await?;

    if spec.is_direct() {
        let archive = work_dir.join(spec.image_archive_name());
        println!("saving image archive {}", archive.display());
        let save = format!(
            "docker save {} | gzip > {}",
            shell_quote(&spec.image_ref()),
            shell_quote(&archive.display().to_string())
        );
        CommandRunner::run_shell(&save, work_dir).await?;
        info!(archive = %archive.display(), "Image archive ready");
        return Ok(Some(archive));
    }

    let image = spec.image_ref();
    CommandRunner::run_streaming("docker", &["tag", &spec.name, &image], work_dir).await?;
    println!("pushing container to registry");
    CommandRunner::run_streaming("docker", &["push", &image], work_dir).await?;
    info!(image = %image, "Image pushed");
    Ok(None)
}

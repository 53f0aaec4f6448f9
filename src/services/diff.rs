//! 本地项目文件与运行中容器内文件的比对（只读）
//!
//! 两侧都按 `.dockerignore` 与 Dockerfile 的 `COPY` 来源过滤，
//! 容器一侧以镜像的工作目录为根。

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::domain::ignore::{CopySources, IgnoreRules, DOCKERFILE, IGNORE_FILE};
use crate::domain::textdiff::unified_diff;
use crate::error::Result;
use crate::infra::RemoteCommand;
use crate::services::ssh::RemoteShell;

/// 一个内容不同的文件
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    /// unified diff，旧侧为容器，新侧为本地
    pub patch: String,
}

/// 比对结果，路径均相对项目根目录且有序
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub workdir: String,
    pub modified: Vec<FileDiff>,
    /// 只在本地存在（尚未部署）
    pub local_only: Vec<String>,
    /// 只在容器中存在（本地已删除）
    pub remote_only: Vec<String>,
}

impl TreeDiff {
    pub fn is_clean(&self) -> bool {
        self.modified.is_empty() && self.local_only.is_empty() && self.remote_only.is_empty()
    }
}

/// 文件过滤条件
struct BuildContext {
    ignore: IgnoreRules,
    sources: CopySources,
}

impl BuildContext {
    async fn load(root: &Path) -> Result<Self> {
        let ignore = IgnoreRules::parse(&read_optional(&root.join(IGNORE_FILE)).await?)?;
        let sources = CopySources::parse(&read_optional(&root.join(DOCKERFILE)).await?);
        debug!(ignore_rules = ignore.user_rules(), sources = ?sources, "Loaded build context filters");
        Ok(Self { ignore, sources })
    }

    fn includes(&self, path: &str) -> bool {
        !self.ignore.is_ignored(path) && self.sources.includes(path)
    }
}

async fn read_optional(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// 容器工作目录，未设置时为 `/`
async fn container_workdir(shell: &dyn RemoteShell, name: &str) -> Result<String> {
    let cmd = RemoteCommand::new("docker")
        .args(["inspect", "--format", "{{.Config.WorkingDir}}"])
        .arg(name);
    let workdir = shell.run_silent(&cmd).await?.stdout.trim().to_string();
    Ok(if workdir.is_empty() { "/".to_string() } else { workdir })
}

fn container_path(workdir: &str, rel: &str) -> String {
    format!("{}/{}", workdir.trim_end_matches('/'), rel)
}

/// 本地项目中的文件（相对路径，`/` 分隔）
async fn local_files(root: &Path, ctx: &BuildContext) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, rel_dir)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if rel_dir.is_empty() {
                name
            } else {
                format!("{}/{}", rel_dir, name)
            };
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                // 整个目录被排除时不再深入
                if !ctx.ignore.is_ignored(&rel) {
                    pending.push((entry.path(), rel));
                }
            } else if file_type.is_file() && ctx.includes(&rel) {
                files.insert(rel);
            }
        }
    }
    Ok(files)
}

/// 容器工作目录下的文件
async fn container_files(
    shell: &dyn RemoteShell,
    name: &str,
    workdir: &str,
    ctx: &BuildContext,
) -> Result<BTreeSet<String>> {
    let cmd = RemoteCommand::new("docker")
        .args(["exec", name, "find", workdir, "-type", "f"])
        .tolerate_failure();
    let output = shell.run_silent(&cmd).await?;
    let prefix = container_path(workdir, "");
    Ok(output
        .stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(prefix.as_str()))
        .filter(|rel| !rel.is_empty() && ctx.includes(rel))
        .map(str::to_string)
        .collect())
}

/// 比对本地项目与容器 `name` 中的文件
pub async fn compare(shell: &dyn RemoteShell, name: &str, root: &Path) -> Result<TreeDiff> {
    let ctx = BuildContext::load(root).await?;
    let workdir = container_workdir(shell, name).await?;
    info!(container = name, workdir = %workdir, "Comparing local files with container");

    let local = local_files(root, &ctx).await?;
    let remote = container_files(shell, name, &workdir, &ctx).await?;

    let mut modified = Vec::new();
    for path in local.intersection(&remote) {
        let cat = RemoteCommand::new("docker")
            .args(["exec", name, "cat"])
            .arg(container_path(&workdir, path));
        let deployed = match shell.run_silent(&cat).await {
            Ok(output) => output.stdout,
            Err(e) => {
                warn!(path = %path, error = %e, "Cannot read file from container, skipping");
                continue;
            }
        };
        let current = String::from_utf8_lossy(&tokio::fs::read(root.join(path)).await?).into_owned();
        if current != deployed {
            let patch = unified_diff(
                &deployed,
                &current,
                &format!("a/{} (container)", path),
                &format!("b/{} (local)", path),
            );
            modified.push(FileDiff {
                path: path.clone(),
                patch,
            });
        }
    }

    Ok(TreeDiff {
        workdir,
        modified,
        local_only: local.difference(&remote).cloned().collect(),
        remote_only: remote.difference(&local).cloned().collect(),
    })
}

fn section<'a>(out: &mut String, title: &str, marker: char, paths: impl Iterator<Item = &'a str>) {
    let _ = writeln!(out, "\n=== {} ===", title);
    for path in paths {
        let _ = writeln!(out, "  {} {}", marker, path);
    }
}

/// 终端显示
pub fn render(diff: &TreeDiff) -> String {
    let mut out = format!("container working directory: {}\n", diff.workdir);
    if diff.is_clean() {
        out.push_str("no differences\n");
        return out;
    }

    section(&mut out, "Modified", '~', diff.modified.iter().map(|f| f.path.as_str()));
    section(
        &mut out,
        "Only in local (not deployed)",
        '+',
        diff.local_only.iter().map(String::as_str),
    );
    section(
        &mut out,
        "Only in container (deleted locally)",
        '-',
        diff.remote_only.iter().map(String::as_str),
    );

    for file in diff.modified.iter().filter(|f| !f.patch.is_empty()) {
        out.push('\n');
        out.push_str(&file.patch);
    }

    let _ = writeln!(
        out,
        "\n{} modified, {} only in local, {} only in container",
        diff.modified.len(),
        diff.local_only.len(),
        diff.remote_only.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostctlError;
    use crate::services::ssh::mock::RecordingShell;

    async fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, contents) in files {
            let path = dir.path().join(path);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(path, contents).await.unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_compare() {
        let dir = project(&[
            ("app.py", "print(1)\n"),
            ("src/util.py", "def f():\n    return 1\n"),
            ("README.md", "# alpha\n"),
            ("NOTES.md", "scratch\n"),
            ("hostctl.yml", "name: alpha\n"),
            ("node_modules/left-pad/index.js", "x\n"),
            (".dockerignore", "*.md\n!README.md\n"),
            ("Dockerfile", "FROM python:3.12\nWORKDIR /app\nCOPY . .\n"),
        ])
        .await;
        let shell = RecordingShell::new()
            .respond("docker inspect", "/app\n")
            .respond(
                "find /app -type f",
                "/app/app.py\n/app/src/util.py\n/app/old.py\n/app/__pycache__/app.cpython-312.pyc\n",
            )
            .respond("cat /app/app.py", "print(2)\n")
            .respond("cat /app/src/util.py", "def f():\n    return 1\n");

        let diff = compare(&shell, "alpha", dir.path()).await.unwrap();
        assert_eq!(diff.workdir, "/app");
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].path, "app.py");
        assert!(diff.modified[0].patch.contains("--- a/app.py (container)\n+++ b/app.py (local)\n"));
        assert!(diff.modified[0].patch.contains("-print(2)\n+print(1)\n"));
        assert_eq!(diff.local_only, vec!["README.md".to_string()]);
        assert_eq!(diff.remote_only, vec!["old.py".to_string()]);

        assert!(shell.ran("docker inspect --format '{{.Config.WorkingDir}}' alpha"));
        assert!(shell.ran("docker exec alpha find /app -type f || true"));
        // 本地与容器都有的文件才读取内容
        assert!(!shell.ran("cat /app/old.py"));
        assert!(!shell.ran("cat /app/README.md"));

        let text = render(&diff);
        assert!(text.contains("  ~ app.py\n"));
        assert!(text.contains("  + README.md\n"));
        assert!(text.contains("  - old.py\n"));
        assert!(text.contains("1 modified, 1 only in local, 1 only in container"));
    }

    #[tokio::test]
    async fn test_compare_limits_to_copy_sources() {
        let dir = project(&[
            ("src/main.js", "main\n"),
            ("scripts/seed.js", "seed\n"),
            ("package.json", "{}\n"),
            ("Dockerfile", "FROM node:20\nWORKDIR /srv\nCOPY package.json ./\nCOPY src/ ./src/\n"),
        ])
        .await;
        let shell = RecordingShell::new()
            .respond("docker inspect", "/srv/\n")
            .respond(
                "find /srv/ -type f",
                "/srv/package.json\n/srv/src/main.js\n/srv/node_modules/a/index.js\n/srv/dist/bundle.js\n",
            )
            .respond("cat /srv/package.json", "{}\n")
            .respond("cat /srv/src/main.js", "main\n");

        let diff = compare(&shell, "beta", dir.path()).await.unwrap();
        assert!(diff.is_clean(), "{diff:?}");
        assert!(render(&diff).contains("no differences"));
    }

    #[tokio::test]
    async fn test_compare_without_workdir() {
        let dir = project(&[("index.html", "hi\n")]).await;
        let shell = RecordingShell::new()
            .respond("docker inspect", "\n")
            .respond("find / -type f", "/index.html\n/etc/hostname\n")
            .respond("cat /index.html", "hi\n");

        let diff = compare(&shell, "gamma", dir.path()).await.unwrap();
        assert_eq!(diff.workdir, "/");
        assert!(diff.modified.is_empty());
        assert_eq!(diff.remote_only, vec!["etc/hostname".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_container() {
        let dir = project(&[("app.py", "x\n")]).await;
        let shell = RecordingShell::new().fail("docker inspect", 1, "Error: No such object: alpha");
        let err = compare(&shell, "alpha", dir.path()).await.unwrap_err();
        assert!(matches!(err, HostctlError::CommandFailed { status: 1, .. }));
        assert!(!shell.ran("find"));
    }
}

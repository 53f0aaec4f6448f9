//! 构建上下文过滤
//!
//! `diff` 只比较会进入镜像的文件：先按 `.dockerignore`（加上内置的跳过列表）排除，
//! 再按 Dockerfile 中 `COPY`/`ADD` 的来源收窄。路径一律是相对项目根目录、以 `/` 分隔的字符串。
//!
//! 规则语义：
//! - `*` 不跨越 `/`，`**` 匹配任意层目录，`?` 匹配单个字符
//! - 不含 `/` 的模式在任意深度匹配路径中的某一段；含 `/` 的模式从根目录锚定
//! - 命中目录即排除其下所有文件
//! - `!` 开头的模式重新包含，最后一条命中的规则生效

use glob::{MatchOptions, Pattern};

use crate::error::{HostctlError, Result};

/// 忽略文件名
pub const IGNORE_FILE: &str = ".dockerignore";
/// Dockerfile 文件名
pub const DOCKERFILE: &str = "Dockerfile";

/// 无论 `.dockerignore` 如何都不参与比较
const ALWAYS_SKIP: &[&str] = &[
    ".git",
    ".gitignore",
    "hostctl.yml",
    "*.hostctl.yml",
    "hostctl-logs",
    DOCKERFILE,
    IGNORE_FILE,
    "*.tar.gz",
    "__pycache__",
    "*.pyc",
    "node_modules",
    "target",
    ".venv",
    ".env",
    ".DS_Store",
    "*.swp",
    ".idea",
    ".vscode",
    "*.log",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Clone, Debug)]
struct Rule {
    pattern: Pattern,
    negated: bool,
    anchored: bool,
}

impl Rule {
    /// 空行与注释返回 `None`
    fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (negated, body) = match line.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, line),
        };
        let body = body.trim_start_matches("./").trim_matches('/');
        if body.is_empty() {
            return Ok(None);
        }

        let pattern = Pattern::new(body).map_err(|source| HostctlError::IgnorePattern {
            pattern: line.to_string(),
            source,
        })?;
        Ok(Some(Self {
            pattern,
            negated,
            anchored: body.contains('/'),
        }))
    }

    /// 路径本身或其任一上级目录命中即算命中
    fn matches(&self, path: &str) -> bool {
        let mut prefixes = path.match_indices('/').map(|(i, _)| &path[..i]).chain(Some(path));
        prefixes.any(|prefix| {
            if self.pattern.matches_with(prefix, MATCH_OPTIONS) {
                return true;
            }
            if self.anchored {
                return false;
            }
            let last = prefix.rsplit('/').next().unwrap_or(prefix);
            self.pattern.matches_with(last, MATCH_OPTIONS)
        })
    }
}

/// `.dockerignore` 规则集（已包含内置跳过列表）
#[derive(Clone, Debug)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// 解析 `.dockerignore` 内容
    pub fn parse(contents: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for line in ALWAYS_SKIP.iter().copied().chain(contents.lines()) {
            if let Some(rule) = Rule::parse(line)? {
                rules.push(rule);
            }
        }
        Ok(Self { rules })
    }

    /// 用户规则条数（不含内置列表）
    pub fn user_rules(&self) -> usize {
        self.rules.len().saturating_sub(ALWAYS_SKIP.len())
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(path))
            .map(|rule| !rule.negated)
            .unwrap_or(false)
    }
}

/// Dockerfile 中来自构建上下文的 `COPY`/`ADD` 来源
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CopySources {
    /// 没有 Dockerfile，或存在 `COPY .`
    Everything,
    Only(Vec<String>),
}

impl CopySources {
    /// 解析 Dockerfile
    ///
    /// `--from=<stage>` 的指令复制的是其他构建阶段的产物，不计入来源
    pub fn parse(dockerfile: &str) -> Self {
        let mut sources = Vec::new();
        for line in dockerfile.lines().map(str::trim) {
            let Some((instruction, rest)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            if !instruction.eq_ignore_ascii_case("COPY") && !instruction.eq_ignore_ascii_case("ADD") {
                continue;
            }

            let mut words = instruction_words(rest.trim());
            if words.iter().any(|w| w.starts_with("--from=")) {
                continue;
            }
            words.retain(|w| !w.starts_with("--"));
            // 最后一个是目标路径
            if words.len() < 2 {
                continue;
            }
            words.pop();

            for src in words {
                let src = src.trim_start_matches("./").trim_end_matches('/');
                if src.is_empty() || src == "." {
                    return CopySources::Everything;
                }
                sources.push(src.to_string());
            }
        }

        if sources.is_empty() {
            CopySources::Everything
        } else {
            CopySources::Only(sources)
        }
    }

    pub fn includes(&self, path: &str) -> bool {
        match self {
            CopySources::Everything => true,
            CopySources::Only(sources) => sources.iter().any(|src| {
                path == src
                    || path.strip_prefix(src.as_str()).is_some_and(|rest| rest.starts_with('/'))
                    || Pattern::new(src).is_ok_and(|p| p.matches_with(path, MATCH_OPTIONS))
            }),
        }
    }
}

/// 支持 shell 形式与 JSON 数组形式
fn instruction_words(rest: &str) -> Vec<String> {
    if rest.starts_with('[') {
        if let Ok(words) = serde_json::from_str::<Vec<String>>(rest) {
            return words;
        }
    }
    rest.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_skips() {
        let rules = IgnoreRules::parse("").unwrap();
        assert_eq!(rules.user_rules(), 0);
        assert!(rules.is_ignored(".git/HEAD"));
        assert!(rules.is_ignored("hostctl.yml"));
        assert!(rules.is_ignored("staging.hostctl.yml"));
        assert!(rules.is_ignored("web/node_modules/react/index.js"));
        assert!(rules.is_ignored("pkg/__pycache__/mod.cpython-311.pyc"));
        assert!(rules.is_ignored("Dockerfile"));
        assert!(!rules.is_ignored("app.py"));
        assert!(!rules.is_ignored("src/targets.rs"));
    }

    #[test]
    fn test_wildcards() {
        let rules = IgnoreRules::parse("# comment\n\n*.md\ndocs/*.txt\nassets/**/raw\ntmp?\n").unwrap();
        assert_eq!(rules.user_rules(), 4);
        assert!(rules.is_ignored("NOTES.md"));
        assert!(rules.is_ignored("pkg/CHANGES.md"));
        assert!(rules.is_ignored("docs/a.txt"));
        // `*` 不跨越目录
        assert!(!rules.is_ignored("docs/sub/a.txt"));
        // 含 `/` 的模式从根目录锚定
        assert!(!rules.is_ignored("web/docs/a.txt"));
        assert!(rules.is_ignored("assets/raw/a.png"));
        assert!(rules.is_ignored("assets/img/2024/raw/a.png"));
        assert!(rules.is_ignored("tmp1/x"));
        assert!(!rules.is_ignored("tmp12/x"));
    }

    #[test]
    fn test_directory_patterns() {
        let rules = IgnoreRules::parse("build/\n./coverage\n/cache\n").unwrap();
        assert!(rules.is_ignored("build/out.js"));
        assert!(rules.is_ignored("web/build/out.js"));
        assert!(rules.is_ignored("coverage/index.html"));
        assert!(rules.is_ignored("cache/a"));
        assert!(!rules.is_ignored("builder.py"));
    }

    #[test]
    fn test_negation_last_match_wins() {
        let rules = IgnoreRules::parse("*.md\n!README.md\n").unwrap();
        assert!(rules.is_ignored("CHANGELOG.md"));
        assert!(!rules.is_ignored("README.md"));

        let rules = IgnoreRules::parse("!README.md\n*.md\n").unwrap();
        assert!(rules.is_ignored("README.md"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = IgnoreRules::parse("a/**b\n").unwrap_err();
        assert!(matches!(err, HostctlError::IgnorePattern { .. }));
    }

    #[test]
    fn test_copy_everything() {
        assert_eq!(CopySources::parse(""), CopySources::Everything);
        let dockerfile = "FROM python:3.12\nWORKDIR /app\nCOPY requirements.txt .\nCOPY . .\n";
        assert_eq!(CopySources::parse(dockerfile), CopySources::Everything);
        assert!(CopySources::Everything.includes("anything/at/all"));
    }

    #[test]
    fn test_copy_sources() {
        let dockerfile = "\
FROM node:20 AS build
COPY package.json package-lock.json ./
RUN npm ci
copy --chown=node:node src/ /app/src/
ADD [\"config/*.yml\", \"/app/config/\"]
FROM nginx
COPY --from=build /app/dist /usr/share/nginx/html
";
        let sources = CopySources::parse(dockerfile);
        assert_eq!(
            sources,
            CopySources::Only(vec![
                "package.json".to_string(),
                "package-lock.json".to_string(),
                "src".to_string(),
                "config/*.yml".to_string(),
            ])
        );
        assert!(sources.includes("package.json"));
        assert!(sources.includes("src/index.ts"));
        assert!(sources.includes("src/lib/util.ts"));
        assert!(sources.includes("config/prod.yml"));
        assert!(!sources.includes("config/nested/prod.yml"));
        assert!(!sources.includes("srcs/index.ts"));
        assert!(!sources.includes("README.md"));
        // `--from` 阶段的来源不是本地文件
        assert!(!sources.includes("app/dist/index.html"));
    }
}

//! 远程命令构建器
//!
//! 命令以结构化形式（程序 + 参数 + 可选管道前驱）构造，只有在执行边界才渲染为 shell 字符串，
//! 这样命令构造可以在没有远程连接的情况下单元测试。

use std::fmt;

/// 单个参数
#[derive(Clone, Debug, PartialEq, Eq)]
enum Arg {
    /// 渲染时按需加单引号
    Quoted(String),
    /// 原样渲染，允许 shell 展开
    Raw(String),
}

/// 输出重定向
#[derive(Clone, Debug, PartialEq, Eq)]
enum Redirect {
    /// `> path`
    Stdout(String),
    /// `> path 2>&1`
    Combined(String),
}

/// 远程 shell 命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCommand {
    program: String,
    args: Vec<Arg>,
    piped_from: Option<Box<RemoteCommand>>,
    redirect: Option<Redirect>,
    tolerate_failure: bool,
    /// 完整脚本（不参与引号处理）
    script: Option<String>,
}

impl RemoteCommand {
    /// 创建新命令
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            piped_from: None,
            redirect: None,
            tolerate_failure: false,
            script: None,
        }
    }

    /// 原样 shell 脚本，用于需要变量/命令替换的场景
    pub fn script(script: impl Into<String>) -> Self {
        let script = script.into();
        Self {
            program: String::new(),
            args: Vec::new(),
            piped_from: None,
            redirect: None,
            tolerate_failure: false,
            script: Some(script),
        }
    }

    /// 追加一个参数（渲染时转义）
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Quoted(arg.into()));
        self
    }

    /// 追加多个参数
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|a| Arg::Quoted(a.into())));
        self
    }

    /// 追加一个不转义的参数
    pub fn raw_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Raw(arg.into()));
        self
    }

    /// 以 `predecessor | self` 的形式连接管道
    pub fn piped_from(mut self, predecessor: RemoteCommand) -> Self {
        self.piped_from = Some(Box::new(predecessor));
        self
    }

    /// 标准输出重定向到文件
    pub fn stdout_to(mut self, path: impl Into<String>) -> Self {
        self.redirect = Some(Redirect::Stdout(path.into()));
        self
    }

    /// 标准输出与标准错误一起重定向到文件
    pub fn output_to(mut self, path: impl Into<String>) -> Self {
        self.redirect = Some(Redirect::Combined(path.into()));
        self
    }

    /// 失败时不视为错误 (`|| true`)
    pub fn tolerate_failure(mut self) -> Self {
        self.tolerate_failure = true;
        self
    }

    /// 程序名（脚本形式为空）
    pub fn program(&self) -> &str {
        &self.program
    }

    /// 渲染为 POSIX shell 字符串
    pub fn render(&self) -> String {
        let mut out = String::new();

        if let Some(ref prev) = self.piped_from {
            out.push_str(&prev.render_pipeline_stage());
            out.push_str(" | ");
        }

        out.push_str(&self.render_pipeline_stage());

        match self.redirect {
            Some(Redirect::Stdout(ref path)) => {
                out.push_str(" > ");
                out.push_str(&shell_quote(path));
            }
            Some(Redirect::Combined(ref path)) => {
                out.push_str(" > ");
                out.push_str(&shell_quote(path));
                out.push_str(" 2>&1");
            }
            None => {}
        }

        if self.tolerate_failure {
            out.push_str(" || true");
        }

        out
    }

    fn render_pipeline_stage(&self) -> String {
        if let Some(ref script) = self.script {
            return script.clone();
        }

        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(shell_quote(&self.program));
        for arg in &self.args {
            match arg {
                Arg::Quoted(s) => parts.push(shell_quote(s)),
                Arg::Raw(s) => parts.push(s.clone()),
            }
        }
        parts.join(" ")
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// POSIX 单引号转义，安全字符组成的字符串原样返回
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | ',' | '+' | '%')
        });
    if safe {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

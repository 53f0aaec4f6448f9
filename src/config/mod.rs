//! 配置模块
//!
//! 项目文件解析、环境变量覆盖与常量

pub mod env;
pub mod project;

pub use env::EnvOverrides;
pub use project::{init_project, ProjectConfig, ProjectFile};

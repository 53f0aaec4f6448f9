//! 基础设施模块
//!
//! 封装外部依赖（本地命令执行、远程命令构造、终止信号）

pub mod command;
pub mod remote_command;
pub mod signal;

pub use command::CommandRunner;
pub use remote_command::{shell_quote, RemoteCommand};
pub use signal::shutdown_signal;

//! 服务层模块
//!
//! 远程编排逻辑：主机准备、部署流水线、日志、监控、文件比对与隧道

pub mod deploy;
pub mod diff;
pub mod logs;
pub mod monitor;
pub mod provision;
pub mod ssh;
pub mod tunnel;
pub mod ui;

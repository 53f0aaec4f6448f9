//! XJP Hostctl - 单主机部署工具
//!
//! 通过 SSH 在一台主机上安装 Docker 与 Traefik，并部署、观察、拆除一个命名容器

pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

pub use error::{HostctlError, Result};

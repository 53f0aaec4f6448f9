//! 主机准备
//!
//! 探测操作系统、安装容器运行时、仓库认证与反向代理，全部幂等

pub mod probe;
pub mod proxy;
pub mod registry;
pub mod runtime;

pub use probe::detect_os_family;
pub use proxy::ProxyOutcome;

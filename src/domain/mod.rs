//! 领域模型模块
//!
//! 纯数据结构与纯函数，不依赖远程连接

pub mod deploy;
pub mod host;
pub mod ignore;
pub mod proxy;
pub mod registry;
pub mod ssh;
pub mod system;
pub mod textdiff;

// Re-exports for convenience
pub use deploy::{DeployStage, DeployStatus, DeploymentSpec, StageStatus, VolumeMount, WebAdvancedConfig};
pub use host::HostOsClass;
pub use ignore::{CopySources, IgnoreRules};
pub use proxy::{ProxyDocument, Timeout};
pub use registry::RegistryClass;
pub use ssh::RemoteTarget;
pub use system::{ContainerCounts, DiskInfo, HostSnapshot, LoadAverage, MemoryInfo, NetworkInfo};

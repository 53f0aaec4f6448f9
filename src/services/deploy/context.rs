//! 部署阶段跟踪
//!
//! 记录每个阶段的状态与耗时，结束时（无论成功失败）打印阶段摘要

use std::future::Future;

use tracing::{error, info};

use crate::domain::deploy::{DeployStage, DeployStatus, StageStatus};
use crate::error::Result;

/// 阶段跟踪器
#[derive(Clone, Debug, Default)]
pub struct StageTracker {
    stages: Vec<DeployStage>,
}

impl StageTracker {
    /// 以 (标识, 显示名) 列表创建
    pub fn new(stages: &[(&str, &str)]) -> Self {
        Self {
            stages: stages
                .iter()
                .map(|(name, display)| DeployStage::new(name, display))
                .collect(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    /// 执行一个阶段，失败时记录原因并原样返回错误
    pub async fn track<T, F>(&mut self, name: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let total = self.stages.len();
        let idx = self.position(name);
        if let Some(i) = idx {
            self.stages[i].start();
            println!("[{}/{}] {}", i + 1, total, self.stages[i].display_name);
        }

        let result = fut.await;

        if let Some(i) = idx {
            match result {
                Ok(_) => {
                    self.stages[i].finish(true, None);
                    info!(stage = name, duration_ms = ?self.stages[i].duration_ms, "Stage finished");
                }
                Err(ref e) => {
                    self.stages[i].finish(false, Some(e.to_string()));
                    error!(stage = name, error = %e, "Stage failed");
                }
            }
        }
        result
    }

    /// 跳过阶段
    pub fn skip(&mut self, name: &str, reason: &str) {
        if let Some(i) = self.position(name) {
            self.stages[i].skip(Some(reason.to_string()));
        }
    }

    /// 记录阶段附加信息
    pub fn note(&mut self, name: &str, message: impl Into<String>) {
        if let Some(i) = self.position(name) {
            self.stages[i].message = Some(message.into());
        }
    }

    pub fn get(&self, name: &str) -> Option<&DeployStage> {
        self.position(name).map(|i| &self.stages[i])
    }

    /// 总体状态
    pub fn status(&self) -> DeployStatus {
        if self.stages.iter().any(|s| s.status == StageStatus::Failed) {
            DeployStatus::Failed
        } else if self
            .stages
            .iter()
            .any(|s| matches!(s.status, StageStatus::Running | StageStatus::Pending))
        {
            DeployStatus::Running
        } else {
            DeployStatus::Success
        }
    }

    /// 阶段摘要
    pub fn summary(&self) -> String {
        let mut out = String::from("=== Stage Summary ===\n");
        for stage in &self.stages {
            out.push_str("  ");
            out.push_str(&stage.summary_line());
            out.push('\n');
        }
        out.push_str(&format!("Result: {}", self.status()));
        out
    }
}

//! 工作调度（WorkManager）
//!
//! 容器提供的异步工作池抽象：
//! - `Work`：一次性执行的工作项；
//! - `WorkManager`：提交工作项，池饱和或正在关闭时立即拒绝，不阻塞调用方；
//! - `TokioWorkManager`：基于 tokio 的实现，信号量限制并发，支持优雅关闭。
//!
use crate::error::WorkError;
use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// 工作项：在工作池中执行一次
#[async_trait]
pub trait Work: Send + Sync {
    async fn run(&self);

    /// 执行结束后调用
    fn release(&self) {}
}

/// 工作调度器
pub trait WorkManager: Send + Sync {
    /// 提交工作项；不得阻塞
    fn schedule_work(&self, work: Box<dyn Work>) -> Result<(), WorkError>;
}

/// 工作池配置
#[derive(Clone, Copy, Debug, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkManagerConfig {
    /// 同时存在（执行中 + 等待中）的工作项上限
    #[builder(default = 64)]
    pub max_concurrent_work: usize,
}

impl Default for WorkManagerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// 基于 tokio 的工作池
#[derive(Clone)]
pub struct TokioWorkManager {
    handle: Handle,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    config: WorkManagerConfig,
}

impl TokioWorkManager {
    pub fn new(config: WorkManagerConfig, handle: Handle) -> Self {
        Self {
            handle,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_work)),
            config,
        }
    }

    /// 使用当前 tokio 运行时构造
    pub fn current(config: WorkManagerConfig) -> Result<Self, WorkError> {
        let handle = Handle::try_current().map_err(|e| WorkError::Rejected {
            reason: e.to_string(),
        })?;
        Ok(Self::new(config, handle))
    }

    pub fn config(&self) -> &WorkManagerConfig {
        &self.config
    }

    /// 当前在池中的工作项数量
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.tracker.is_closed()
    }

    /// 停止接收新工作，并等待已提交的工作项执行完毕
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl WorkManager for TokioWorkManager {
    fn schedule_work(&self, work: Box<dyn Work>) -> Result<(), WorkError> {
        if self.tracker.is_closed() {
            return Err(WorkError::ShuttingDown);
        }
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| WorkError::Saturated {
                capacity: self.config.max_concurrent_work,
            })?;

        self.tracker.spawn_on(
            async move {
                work.run().await;
                work.release();
                drop(permit);
            },
            &self.handle,
        );
        Ok(())
    }
}

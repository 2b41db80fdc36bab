//! 入站适配层统一错误定义
//!
//! 按来源划分为三类：
//! - 配置错误：激活配置缺失/非法；
//! - 生命周期错误：共享平台启动失败；
//! - 装配错误：订阅时平台未就绪、端点创建失败、工作项被拒绝。
//!
//! 装配错误视为致命错误（`is_fatal`），直接上抛至触发点，本层不做重试。
//!
use thiserror::Error;

/// 工作调度失败原因
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkError {
    #[error("work manager saturated: capacity={capacity}")]
    Saturated { capacity: usize },
    #[error("work manager is shutting down")]
    ShuttingDown,
    #[error("work rejected: {reason}")]
    Rejected { reason: String },
}

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum InflowError {
    // --- 配置 ---
    #[error("invalid activation config: {reason}")]
    InvalidConfig { reason: String },
    #[error("config parse error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 平台生命周期 ---
    #[error("platform failed to start: platform={platform}, reason={reason}")]
    PlatformStart { platform: String, reason: String },
    #[error("platform is not running: {platform}")]
    PlatformStopped { platform: String },

    // --- 订阅装配 ---
    #[error("platform did not start yet: address={address}")]
    PlatformNotReady { address: String },
    #[error("can't create the endpoint: address={address}, reason={source}")]
    EndpointCreation {
        address: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("can't handle message: address={address}, reason={source}")]
    WorkRejected {
        address: String,
        #[source]
        source: WorkError,
    },
    #[error("subscription failed: address={address}, reason={reason}")]
    Subscription { address: String, reason: String },
}

impl InflowError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// 装配期错误：说明生命周期编排存在问题，不应重试
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PlatformNotReady { .. }
                | Self::EndpointCreation { .. }
                | Self::WorkRejected { .. }
                | Self::Subscription { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type InflowResult<T> = Result<T, InflowError>;

use crate::error::AdapterResult;
use bon::Builder;
use inflow_core::WorkManagerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 资源适配器配置
///
/// 典型用法：
/// ```rust
/// use inflow_adapter::ResourceAdapterConfig;
///
/// let cfg = ResourceAdapterConfig::from_json(&serde_json::json!({
///     "work": { "max_concurrent_work": 16 },
///     "shutdown_timeout_ms": 2000
/// }))
/// .unwrap();
/// assert_eq!(cfg.work.max_concurrent_work, 16);
/// ```
#[derive(Clone, Debug, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceAdapterConfig {
    /// 工作池配置
    #[builder(default)]
    pub work: WorkManagerConfig,
    /// 停止时等待在途工作项完成的上限（毫秒）
    #[builder(default = 10_000)]
    pub shutdown_timeout_ms: u64,
}

impl Default for ResourceAdapterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ResourceAdapterConfig {
    pub fn from_json(value: &serde_json::Value) -> AdapterResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

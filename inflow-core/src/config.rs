//! 配置模型
//!
//! - `PlatformConfig`：共享平台的配置描述，同时作为注册表中平台实例的身份键；
//! - `ActivationSpec`：单个端点激活的配置（订阅地址 + 平台配置），由容器从部署元数据构造，之后只读。
//!
//! 两者均可通过 builder 构造，或从 JSON 反序列化（缺省字段取默认值）。
//!
use crate::error::{InflowError, InflowResult};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 共享平台配置
///
/// 相等的配置共享同一个平台实例。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// 平台名称（用于日志与区分不同配置）
    #[builder(into, default = String::from("default"))]
    pub name: String,
    /// 集群模式：平台在后台异步启动，请求方通过就绪通知获得平台
    #[builder(default)]
    pub clustered: bool,
    #[builder(into)]
    pub cluster_host: Option<String>,
    pub cluster_port: Option<u16>,
    /// 每个消费者的事件缓冲容量
    #[builder(default = 1024)]
    pub event_bus_capacity: usize,
    /// 平台启动超时（毫秒）
    #[builder(default = 30_000)]
    pub start_timeout_ms: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PlatformConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn validate(&self) -> InflowResult<()> {
        if self.name.trim().is_empty() {
            return Err(InflowError::invalid_config("platform name is empty"));
        }
        if self.event_bus_capacity == 0 {
            return Err(InflowError::invalid_config(
                "event bus capacity must be greater than zero",
            ));
        }
        if self.clustered && self.cluster_port == Some(0) {
            return Err(InflowError::invalid_config("cluster port must not be 0"));
        }
        Ok(())
    }
}

impl fmt::Display for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.cluster_host, self.cluster_port) {
            (Some(host), Some(port)) if self.clustered => {
                write!(f, "{}@{}:{}", self.name, host, port)
            }
            _ if self.clustered => write!(f, "{}(clustered)", self.name),
            _ => f.write_str(&self.name),
        }
    }
}

/// 端点激活配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationSpec {
    /// 订阅地址
    #[builder(into)]
    pub address: Option<String>,
    #[builder(default)]
    pub platform: PlatformConfig,
}

impl ActivationSpec {
    /// 从部署元数据（JSON）构造
    pub fn from_json(value: &serde_json::Value) -> InflowResult<Self> {
        let spec: Self = serde_json::from_value(value.clone())?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> InflowResult<()> {
        self.address()?;
        self.platform.validate()
    }

    /// 订阅地址；缺失或空白视为配置错误
    pub fn address(&self) -> InflowResult<&str> {
        match self.address.as_deref().map(str::trim) {
            Some(addr) if !addr.is_empty() => Ok(addr),
            _ => Err(InflowError::invalid_config("address is missing")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spec_from_json_fills_defaults() {
        let spec = ActivationSpec::from_json(&json!({ "address": "orders.created" })).unwrap();
        assert_eq!(spec.address().unwrap(), "orders.created");
        assert_eq!(spec.platform, PlatformConfig::default());
        assert!(!spec.platform.clustered);
    }

    #[test]
    fn missing_or_blank_address_is_rejected() {
        let err = ActivationSpec::from_json(&json!({})).unwrap_err();
        assert!(matches!(err, InflowError::InvalidConfig { .. }));

        let blank = ActivationSpec::builder().address("   ").build();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn equal_platform_configs_share_identity() {
        let a = PlatformConfig::builder().name("p").build();
        let b = PlatformConfig::builder().name("p").build();
        let c = PlatformConfig::builder().name("p").clustered(true).build();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(c.to_string(), "p(clustered)");
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let cfg = PlatformConfig::builder().event_bus_capacity(0).build();
        assert!(cfg.validate().is_err());
    }
}

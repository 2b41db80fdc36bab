//! 事件总线平台（platform）
//!
//! 被包装的平台与本层之间的协议：
//! - `Platform`：运行中的平台实例，暴露事件总线并可关闭；
//! - `EventBus`：按地址注册消费者、发布（广播）与发送（点对点）消息；
//! - `PlatformFactory`：按配置启动平台；
//! - `PlatformListener` / `PlatformHolder`：就绪通知与引用持有者协议；
//! - `PlatformRegistry`：进程级共享平台的生命周期管理（引用计数）。
//!
//! `embedded` 提供一个内存版平台实现，用于嵌入式部署与测试。
//!
pub mod embedded;
pub mod registry;

pub use embedded::{EmbeddedEventBus, EmbeddedPlatform, EmbeddedPlatformFactory};
pub use registry::{PlatformLookup, PlatformRegistry};

use crate::config::PlatformConfig;
use crate::error::InflowResult;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 共享平台句柄
pub type PlatformHandle = Arc<dyn Platform>;

/// 持有者标识（每个激活一个）
pub type HolderId = Uuid;

/// 消息处理回调：在平台的分发任务上执行，不得阻塞
pub type MessageHandler = Arc<dyn Fn(Message) -> anyhow::Result<()> + Send + Sync>;

/// 运行中的平台实例
#[async_trait]
pub trait Platform: Send + Sync {
    fn platform_id(&self) -> &str;

    fn event_bus(&self) -> &dyn EventBus;

    fn is_running(&self) -> bool;

    /// 关闭平台；重复调用无副作用
    async fn shutdown(&self);
}

/// 事件总线
pub trait EventBus: Send + Sync {
    /// 在 `address` 上注册消费者；返回前注册即已生效
    fn consumer(&self, address: &str, handler: MessageHandler) -> InflowResult<Subscription>;

    /// 广播给该地址上的全部消费者，返回投递数量
    fn publish(&self, message: Message) -> InflowResult<usize>;

    /// 点对点发送给该地址上的一个消费者，返回是否投递成功
    fn send(&self, message: Message) -> InflowResult<bool>;
}

/// 平台工厂
#[async_trait]
pub trait PlatformFactory: Send + Sync {
    async fn start(&self, config: &PlatformConfig) -> anyhow::Result<PlatformHandle>;
}

/// 平台就绪通知
pub trait PlatformListener: Send + Sync {
    fn platform_ready(&self, platform: PlatformHandle);

    fn platform_failed(&self, reason: &str);
}

/// 平台引用持有者
pub trait PlatformHolder: Send + Sync {
    fn holder_id(&self) -> HolderId;

    fn platform_config(&self) -> &PlatformConfig;
}

/// 消费者注册句柄
///
/// `unregister` 或 drop 之后，该消费者不再收到任何消息。
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    address: String,
    token: CancellationToken,
}

impl Subscription {
    pub fn new(address: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: address.into(),
            token,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_registered(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn unregister(&self) {
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}

//! 事件总线入站适配核心库（inflow-core）
//!
//! 让容器把嵌入式事件总线平台上的消息投递给容器管理的消息端点，遵循入站资源适配器的激活生命周期：
//! - 平台生命周期（`platform::PlatformRegistry`）：按配置共享平台实例，引用计数，最后一个持有者释放后关闭；
//! - 激活（`activation::Activation`）：获取/等待平台，在配置地址上建立订阅，停止时拆除；
//! - 投递桥（`delivery::DeliveryBridge`）：每条入站消息包装为一个工作项提交给工作池；
//! - 工作池（`work`）：容器工作调度协议及基于 tokio 的实现。
//!
//! 典型用法：
//! 1. 以 `PlatformFactory` 构造 `PlatformRegistry`（进程内共享，按引用传递）；
//! 2. 为每个端点配置构造 `Activation` 并调用 `start`；
//! 3. 端点不再需要时调用 `stop`，最后一个持有者离开后平台随之关闭。
//!
pub mod activation;
pub mod config;
pub mod delivery;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod platform;
pub mod work;

pub use activation::{Activation, ActivationState};
pub use config::{ActivationSpec, PlatformConfig};
pub use endpoint::{EndpointFactory, MessageEndpoint};
pub use error::{InflowError, InflowResult, WorkError};
pub use message::Message;
pub use platform::{PlatformHandle, PlatformRegistry};
pub use work::{TokioWorkManager, WorkManager, WorkManagerConfig};

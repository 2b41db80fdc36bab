//! 端点激活（Activation）
//!
//! 一个端点配置与共享平台之间的活动绑定，负责订阅的建立与拆除。
//!
//! 状态机：`Inactive → WaitingForPlatform → SettingUp → Subscribed`，
//! `start` 时平台已可用则跳过等待；`stop` 将任意状态重置为 `Inactive`。
//! 状态转换均通过单次 CAS 完成，同一激活的订阅装配不会并发执行。
//!
use crate::config::{ActivationSpec, PlatformConfig};
use crate::delivery::DeliveryBridge;
use crate::endpoint::{EndpointFactory, MessageEndpoint};
use crate::error::{InflowError, InflowResult};
use crate::platform::{
    HolderId, PlatformHandle, PlatformHolder, PlatformListener, PlatformLookup, PlatformRegistry,
    Subscription,
};
use crate::work::WorkManager;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 激活状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActivationState {
    Inactive = 0,
    WaitingForPlatform = 1,
    SettingUp = 2,
    /// 投递已激活
    Subscribed = 3,
}

impl ActivationState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::WaitingForPlatform,
            2 => Self::SettingUp,
            3 => Self::Subscribed,
            _ => Self::Inactive,
        }
    }
}

/// 已建立的订阅：端点 + 总线注册
struct Binding {
    endpoint: Arc<dyn MessageEndpoint>,
    subscription: Subscription,
}

impl Binding {
    fn close(self) {
        self.subscription.unregister();
        self.endpoint.release();
    }
}

/// 端点激活
pub struct Activation {
    id: HolderId,
    spec: ActivationSpec,
    endpoint_factory: Arc<dyn EndpointFactory>,
    registry: Arc<PlatformRegistry>,
    work_manager: Arc<dyn WorkManager>,
    state: AtomicU8,
    platform: Mutex<Option<PlatformHandle>>,
    binding: Mutex<Option<Binding>>,
    me: Weak<Activation>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Activation {
    pub fn new(
        spec: ActivationSpec,
        endpoint_factory: Arc<dyn EndpointFactory>,
        registry: Arc<PlatformRegistry>,
        work_manager: Arc<dyn WorkManager>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id: Uuid::new_v4(),
            spec,
            endpoint_factory,
            registry,
            work_manager,
            state: AtomicU8::new(ActivationState::Inactive as u8),
            platform: Mutex::new(None),
            binding: Mutex::new(None),
            me: me.clone(),
        })
    }

    pub fn id(&self) -> HolderId {
        self.id
    }

    pub fn activation_spec(&self) -> &ActivationSpec {
        &self.spec
    }

    pub fn endpoint_factory(&self) -> &Arc<dyn EndpointFactory> {
        &self.endpoint_factory
    }

    pub fn state(&self) -> ActivationState {
        ActivationState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_delivery_active(&self) -> bool {
        self.state() == ActivationState::Subscribed
    }

    /// 当前持有的平台（就绪前为空）
    pub fn platform(&self) -> Option<PlatformHandle> {
        locked(&self.platform).clone()
    }

    fn transition(&self, from: ActivationState, to: ActivationState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 启动激活
    ///
    /// 投递未激活时获取（或等待）共享平台；投递已激活时重新装配订阅，替换而非叠加原订阅。
    pub async fn start(&self) -> InflowResult<()> {
        let address = self.spec.address()?;

        match self.state() {
            ActivationState::Subscribed => return self.resubscribe(),
            ActivationState::WaitingForPlatform | ActivationState::SettingUp => {
                debug!(address, "activation start already in progress");
                return Ok(());
            }
            ActivationState::Inactive => {}
        }
        if !self.transition(ActivationState::Inactive, ActivationState::WaitingForPlatform) {
            debug!(address, "activation started concurrently");
            return Ok(());
        }

        let listener: Weak<dyn PlatformListener> = self.me.clone();
        let lookup = self
            .registry
            .get_or_create(self.id, &self.spec.platform, listener)
            .await;

        match lookup {
            Err(err) => {
                self.transition(ActivationState::WaitingForPlatform, ActivationState::Inactive);
                Err(err)
            }
            Ok(PlatformLookup::Pending) => {
                info!(address, platform = %self.spec.platform, "waiting for platform readiness");
                Ok(())
            }
            Ok(PlatformLookup::Ready(platform)) => {
                let result = self.activate(platform, &[ActivationState::WaitingForPlatform]);
                if !matches!(result, Ok(true)) {
                    // 装配失败或期间被 stop：回滚，不留下无人持有的平台
                    if self.state() == ActivationState::Inactive {
                        self.registry.remove_holder(self.id, &self.spec.platform);
                    }
                    self.registry
                        .stop_platform_if_unused(&self.spec.platform)
                        .await;
                }
                result.map(|_| ())
            }
        }
    }

    /// 平台就绪
    ///
    /// 投递已激活（或装配进行中）时仅告警；否则登记为持有者、保存平台、装配订阅并标记投递激活。
    pub fn on_platform_ready(&self, platform: PlatformHandle) -> InflowResult<()> {
        self.ready(
            platform,
            &[ActivationState::Inactive, ActivationState::WaitingForPlatform],
        )
    }

    fn ready(&self, platform: PlatformHandle, from: &[ActivationState]) -> InflowResult<()> {
        let result = self.activate(platform, from);
        if !matches!(result, Ok(true)) && self.state() == ActivationState::Inactive {
            self.release_platform();
        }
        result.map(|_| ())
    }

    /// 在同步上下文中放弃平台：注销持有者，并在后台回收无人持有的平台
    fn release_platform(&self) {
        self.registry.remove_holder(self.id, &self.spec.platform);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let registry = self.registry.clone();
            let config = self.spec.platform.clone();
            handle.spawn(async move {
                registry.stop_platform_if_unused(&config).await;
            });
        }
    }

    /// 返回是否真正完成了一次激活
    ///
    /// 持有者在装配前登记，装配期间平台不会因其他激活停止而被关闭；失败时撤销登记。
    fn activate(&self, platform: PlatformHandle, from: &[ActivationState]) -> InflowResult<bool> {
        if !from
            .iter()
            .any(|state| self.transition(*state, ActivationState::SettingUp))
        {
            warn!(
                address = self.spec.address.as_deref(),
                state = ?self.state(),
                "platform has been started, delivery already active"
            );
            return Ok(false);
        }

        self.registry.add_holder(self);
        *locked(&self.platform) = Some(platform);
        if let Err(err) = self.setup() {
            locked(&self.platform).take();
            self.transition(ActivationState::SettingUp, ActivationState::Inactive);
            self.registry.remove_holder(self.id, &self.spec.platform);
            return Err(err);
        }

        if !self.transition(ActivationState::SettingUp, ActivationState::Subscribed) {
            self.abandon_setup();
            self.registry.remove_holder(self.id, &self.spec.platform);
            return Ok(false);
        }
        Ok(true)
    }

    fn resubscribe(&self) -> InflowResult<()> {
        if !self.transition(ActivationState::Subscribed, ActivationState::SettingUp) {
            return Ok(());
        }
        let result = self.setup();
        if !self.transition(ActivationState::SettingUp, ActivationState::Subscribed) {
            self.abandon_setup();
            return Ok(());
        }
        result
    }

    /// 装配期间被 stop：撤销刚建立的订阅
    fn abandon_setup(&self) {
        if let Some(binding) = locked(&self.binding).take() {
            binding.close();
        }
        debug!(address = self.spec.address.as_deref(), "activation stopped during setup");
    }

    /// 创建端点并在配置地址上注册投递桥
    fn setup(&self) -> InflowResult<()> {
        let address = self.spec.address()?;
        let platform = self
            .platform()
            .ok_or_else(|| InflowError::PlatformNotReady {
                address: address.to_owned(),
            })?;

        let endpoint = self
            .endpoint_factory
            .create_endpoint(None)
            .map_err(|source| InflowError::EndpointCreation {
                address: address.to_owned(),
                source,
            })?;

        let bridge = DeliveryBridge::new(address, endpoint.clone(), self.work_manager.clone());
        let subscription = match platform.event_bus().consumer(address, bridge.into_handler()) {
            Ok(subscription) => subscription,
            Err(err) => {
                endpoint.release();
                return Err(InflowError::Subscription {
                    address: address.to_owned(),
                    reason: err.to_string(),
                });
            }
        };

        let previous = locked(&self.binding).replace(Binding {
            endpoint,
            subscription,
        });
        if let Some(previous) = previous {
            previous.close();
        }

        info!(
            address,
            platform_id = platform.platform_id(),
            "endpoint created, registered handler on address"
        );
        Ok(())
    }

    /// 停止激活；`start` 未完成时调用同样安全
    pub async fn stop(&self) {
        let previous = ActivationState::from_u8(
            self.state
                .swap(ActivationState::Inactive as u8, Ordering::AcqRel),
        );

        if let Some(binding) = locked(&self.binding).take() {
            binding.close();
        }
        locked(&self.platform).take();

        let removed = self.registry.remove_holder(self.id, &self.spec.platform);
        let stopped = self
            .registry
            .stop_platform_if_unused(&self.spec.platform)
            .await;

        info!(
            address = self.spec.address.as_deref(),
            ?previous,
            removed,
            platform_stopped = stopped,
            "activation stopped"
        );
    }
}

impl PlatformHolder for Activation {
    fn holder_id(&self) -> HolderId {
        self.id
    }

    fn platform_config(&self) -> &PlatformConfig {
        &self.spec.platform
    }
}

impl PlatformListener for Activation {
    fn platform_ready(&self, platform: PlatformHandle) {
        // 注册表只通知仍在等待的激活；等待期间被 stop 的激活不再装配
        if let Err(err) = self.ready(platform, &[ActivationState::WaitingForPlatform]) {
            error!(
                address = self.spec.address.as_deref(),
                error = %err,
                "activation setup failed after platform readiness"
            );
        }
    }

    fn platform_failed(&self, reason: &str) {
        self.transition(ActivationState::WaitingForPlatform, ActivationState::Inactive);
        error!(
            address = self.spec.address.as_deref(),
            platform = %self.spec.platform,
            reason,
            "platform failed to start, activation is inactive"
        );
    }
}

use crate::{
    config::ResourceAdapterConfig,
    error::{AdapterError, AdapterResult},
};
use dashmap::DashMap;
use inflow_core::platform::PlatformFactory;
use inflow_core::{
    Activation, ActivationSpec, EndpointFactory, PlatformRegistry, TokioWorkManager, WorkManager,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// 激活标识，由 `endpoint_activation` 返回，用于 `endpoint_deactivation`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivationKey(Uuid);

impl fmt::Display for ActivationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// 资源适配器
/// - 持有进程内共享的平台注册表与工作池，并以引用传给每个激活
/// - 容器通过 `endpoint_activation` / `endpoint_deactivation` 管理端点激活
/// - `stop` 停止全部激活、关闭剩余平台并等待工作池排空
pub struct ResourceAdapter {
    config: ResourceAdapterConfig,
    registry: Arc<PlatformRegistry>,
    work_manager: Arc<dyn WorkManager>,
    // 适配器自建的工作池，停止时负责关闭
    owned_pool: Option<Arc<TokioWorkManager>>,
    activations: DashMap<ActivationKey, Arc<Activation>>,
    stopped: AtomicBool,
}

impl ResourceAdapter {
    /// 使用当前 tokio 运行时构造自带工作池的适配器
    pub fn new(
        config: ResourceAdapterConfig,
        platform_factory: Arc<dyn PlatformFactory>,
    ) -> AdapterResult<Self> {
        let pool = Arc::new(TokioWorkManager::current(config.work)?);
        Ok(Self {
            config,
            registry: Arc::new(PlatformRegistry::new(platform_factory)),
            work_manager: pool.clone(),
            owned_pool: Some(pool),
            activations: DashMap::new(),
            stopped: AtomicBool::new(false),
        })
    }

    /// 使用容器提供的工作调度器
    pub fn with_work_manager(
        config: ResourceAdapterConfig,
        platform_factory: Arc<dyn PlatformFactory>,
        work_manager: Arc<dyn WorkManager>,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(PlatformRegistry::new(platform_factory)),
            work_manager,
            owned_pool: None,
            activations: DashMap::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ResourceAdapterConfig {
        &self.config
    }

    pub fn platform_registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    /// 激活端点；启动失败时不登记该激活
    pub async fn endpoint_activation(
        &self,
        endpoint_factory: Arc<dyn EndpointFactory>,
        spec: ActivationSpec,
    ) -> AdapterResult<ActivationKey> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(AdapterError::Stopped);
        }
        spec.validate()?;

        let activation = Activation::new(
            spec,
            endpoint_factory,
            self.registry.clone(),
            self.work_manager.clone(),
        );
        activation.start().await?;

        let key = ActivationKey(activation.id());
        info!(
            %key,
            address = activation.activation_spec().address.as_deref(),
            "endpoint activated"
        );
        self.activations.insert(key, activation);

        // 启动期间适配器已停止：`stop` 可能已清空登记表，由本次调用负责停用
        if self.stopped.load(Ordering::Acquire) {
            if let Some((_, activation)) = self.activations.remove(&key) {
                activation.stop().await;
            }
            return Err(AdapterError::Stopped);
        }
        Ok(key)
    }

    /// 停用端点
    pub async fn endpoint_deactivation(&self, key: ActivationKey) -> AdapterResult<()> {
        let Some((_, activation)) = self.activations.remove(&key) else {
            return Err(AdapterError::ActivationNotFound(key.to_string()));
        };
        activation.stop().await;
        info!(%key, "endpoint deactivated");
        Ok(())
    }

    pub fn activation(&self, key: ActivationKey) -> Option<Arc<Activation>> {
        self.activations.get(&key).map(|a| a.value().clone())
    }

    /// 当前登记的激活（只读视图）
    pub fn activations(&self) -> Vec<ActivationKey> {
        self.activations.iter().map(|e| *e.key()).collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// 停止适配器；重复调用无副作用
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let keys = self.activations();
        for key in keys {
            if let Some((_, activation)) = self.activations.remove(&key) {
                activation.stop().await;
            }
        }
        self.registry.shutdown_all().await;

        if let Some(pool) = &self.owned_pool {
            let timeout = self.config.shutdown_timeout();
            if tokio::time::timeout(timeout, pool.shutdown()).await.is_err() {
                warn!(
                    in_flight = pool.in_flight(),
                    ?timeout,
                    "work manager did not drain before shutdown timeout"
                );
            }
        }
        info!("resource adapter stopped");
    }
}

//! 共享平台生命周期管理（PlatformRegistry）
//!
//! 进程级注册表，以 `PlatformConfig` 为键管理共享平台：
//! - 惰性创建：同一配置同一时刻至多一个实例，并发请求共享该实例；
//! - 同步启动：首个请求方等待启动完成并直接获得平台，启动期间到达的请求方获得就绪通知；
//! - 异步启动（集群模式）：启动在后台任务中进行，所有请求方都通过就绪通知获得平台；
//! - 引用计数：请求方在获得 `Ready`/`Pending` 的同一临界区内登记为持有者，
//!   最后一个持有者注销后平台才可被关闭；启动失败时这些登记一并撤销。
//!
//! 内部状态由一把互斥锁保护，锁不跨越 `.await`，也不在通知回调期间持有。
//!
use super::{HolderId, PlatformFactory, PlatformHandle, PlatformHolder, PlatformListener};
use crate::config::PlatformConfig;
use crate::error::{InflowError, InflowResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info, warn};

/// `get_or_create` 的结果
pub enum PlatformLookup {
    /// 平台已可用
    Ready(PlatformHandle),
    /// 平台启动中，完成后通过 `PlatformListener` 通知
    Pending,
}

struct Waiter {
    holder_id: HolderId,
    listener: Weak<dyn PlatformListener>,
}

enum Slot {
    Starting { waiters: Vec<Waiter> },
    Running(PlatformHandle),
}

#[derive(Default)]
struct Inner {
    slots: HashMap<PlatformConfig, Slot>,
    holders: HashMap<PlatformConfig, HashSet<HolderId>>,
}

/// 共享平台注册表
pub struct PlatformRegistry {
    factory: Arc<dyn PlatformFactory>,
    inner: Mutex<Inner>,
    created: AtomicUsize,
}

impl PlatformRegistry {
    pub fn new(factory: Arc<dyn PlatformFactory>) -> Self {
        Self {
            factory,
            inner: Mutex::new(Inner::default()),
            created: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 获取或启动 `config` 对应的共享平台
    ///
    /// 返回 `Ready` 或 `Pending` 时 `holder_id` 已登记为持有者，不再需要时由调用方 `remove_holder`。
    /// 返回 `Pending` 时，`listener` 之后恰好收到一次 `platform_ready` 或 `platform_failed`；
    /// 返回 `Ready` 时不会再收到通知。
    pub async fn get_or_create(
        self: &Arc<Self>,
        holder_id: HolderId,
        config: &PlatformConfig,
        listener: Weak<dyn PlatformListener>,
    ) -> InflowResult<PlatformLookup> {
        config.validate()?;

        {
            let mut inner = self.lock();
            inner
                .holders
                .entry(config.clone())
                .or_default()
                .insert(holder_id);
            match inner.slots.get_mut(config) {
                Some(Slot::Running(platform)) => return Ok(PlatformLookup::Ready(platform.clone())),
                Some(Slot::Starting { waiters }) => {
                    waiters.push(Waiter {
                        holder_id,
                        listener,
                    });
                    debug!(platform = %config, %holder_id, "platform starting, waiting for readiness");
                    return Ok(PlatformLookup::Pending);
                }
                None => {
                    let waiters = if config.clustered {
                        vec![Waiter {
                            holder_id,
                            listener,
                        }]
                    } else {
                        Vec::new()
                    };
                    inner.slots.insert(config.clone(), Slot::Starting { waiters });
                }
            }
        }

        if config.clustered {
            let this = self.clone();
            let config = config.clone();
            tokio::spawn(async move {
                let result = this.launch(&config).await;
                if this.complete_start(&config, None, result).is_ok() {
                    // 等待者均已离开或装配失败时，不保留无人持有的平台
                    this.stop_platform_if_unused(&config).await;
                }
            });
            return Ok(PlatformLookup::Pending);
        }

        let result = self.launch(config).await;
        self.complete_start(config, Some(holder_id), result)
            .map(PlatformLookup::Ready)
    }

    async fn launch(&self, config: &PlatformConfig) -> InflowResult<PlatformHandle> {
        info!(platform = %config, "starting platform");
        match tokio::time::timeout(config.start_timeout(), self.factory.start(config)).await {
            Ok(Ok(platform)) => Ok(platform),
            Ok(Err(err)) => Err(InflowError::PlatformStart {
                platform: config.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(InflowError::PlatformStart {
                platform: config.to_string(),
                reason: format!("start timed out after {:?}", config.start_timeout()),
            }),
        }
    }

    /// 结束一次启动；失败时撤销 `requester` 与全部等待者的持有登记
    fn complete_start(
        &self,
        config: &PlatformConfig,
        requester: Option<HolderId>,
        result: InflowResult<PlatformHandle>,
    ) -> InflowResult<PlatformHandle> {
        let waiters = {
            let mut inner = self.lock();
            let waiters = match inner.slots.remove(config) {
                Some(Slot::Starting { waiters }) => waiters,
                Some(running @ Slot::Running(_)) => {
                    inner.slots.insert(config.clone(), running);
                    Vec::new()
                }
                None => Vec::new(),
            };
            match &result {
                Ok(platform) => {
                    inner
                        .slots
                        .insert(config.clone(), Slot::Running(platform.clone()));
                    self.created.fetch_add(1, Ordering::SeqCst);
                }
                Err(_) => {
                    let failed = requester
                        .into_iter()
                        .chain(waiters.iter().map(|w| w.holder_id));
                    for holder_id in failed {
                        forget_holder(&mut inner, config, holder_id);
                    }
                }
            }
            waiters
        };

        match &result {
            Ok(platform) => {
                info!(
                    platform = %config,
                    platform_id = platform.platform_id(),
                    waiters = waiters.len(),
                    "platform is ready"
                );
                self.notify_ready(config, waiters, platform);
            }
            Err(err) => {
                error!(platform = %config, error = %err, "platform failed to start");
                let reason = err.to_string();
                for waiter in waiters {
                    if let Some(listener) = waiter.listener.upgrade() {
                        listener.platform_failed(&reason);
                    }
                }
            }
        }
        result
    }

    fn notify_ready(&self, config: &PlatformConfig, waiters: Vec<Waiter>, platform: &PlatformHandle) {
        for waiter in waiters {
            match waiter.listener.upgrade() {
                Some(listener) => listener.platform_ready(platform.clone()),
                None => {
                    forget_holder(&mut self.lock(), config, waiter.holder_id);
                    debug!(holder_id = %waiter.holder_id, "waiter dropped before readiness");
                }
            }
        }
    }

    /// 注册持有者；已注册时返回 `false`
    pub fn add_holder(&self, holder: &dyn PlatformHolder) -> bool {
        let holder_id = holder.holder_id();
        let config = holder.platform_config();
        let added = self
            .lock()
            .holders
            .entry(config.clone())
            .or_default()
            .insert(holder_id);
        debug!(platform = %config, %holder_id, added, "add platform holder");
        added
    }

    /// 注销持有者，同时取消其尚未完成的就绪等待；未注册时返回 `false`
    pub fn remove_holder(&self, holder_id: HolderId, config: &PlatformConfig) -> bool {
        let mut inner = self.lock();

        if let Some(Slot::Starting { waiters }) = inner.slots.get_mut(config) {
            waiters.retain(|w| w.holder_id != holder_id);
        }

        let removed = forget_holder(&mut inner, config, holder_id);
        drop(inner);

        debug!(platform = %config, %holder_id, removed, "remove platform holder");
        removed
    }

    /// 无持有者时关闭并丢弃平台；返回本次是否关闭了平台
    pub async fn stop_platform_if_unused(&self, config: &PlatformConfig) -> bool {
        let platform = {
            let mut inner = self.lock();
            if inner.holders.get(config).is_some_and(|set| !set.is_empty()) {
                return false;
            }
            if !matches!(inner.slots.get(config), Some(Slot::Running(_))) {
                return false;
            }
            match inner.slots.remove(config) {
                Some(Slot::Running(platform)) => platform,
                _ => return false,
            }
        };

        platform.shutdown().await;
        info!(platform = %config, platform_id = platform.platform_id(), "platform stopped, no holders left");
        true
    }

    /// 关闭全部平台并清空持有者（适配器停止时使用）
    pub async fn shutdown_all(&self) {
        let platforms: Vec<PlatformHandle> = {
            let mut inner = self.lock();
            if !inner.holders.is_empty() {
                warn!(configs = inner.holders.len(), "shutting down platforms that still have holders");
            }
            inner.holders.clear();
            let running = inner
                .slots
                .iter()
                .filter_map(|(_, slot)| match slot {
                    Slot::Running(p) => Some(p.clone()),
                    Slot::Starting { .. } => None,
                })
                .collect();
            inner.slots.retain(|_, slot| matches!(slot, Slot::Starting { .. }));
            running
        };

        for platform in platforms {
            platform.shutdown().await;
        }
    }

    pub fn holder_count(&self, config: &PlatformConfig) -> usize {
        self.lock().holders.get(config).map_or(0, HashSet::len)
    }

    pub fn is_running(&self, config: &PlatformConfig) -> bool {
        matches!(self.lock().slots.get(config), Some(Slot::Running(_)))
    }

    pub fn platform(&self, config: &PlatformConfig) -> Option<PlatformHandle> {
        match self.lock().slots.get(config) {
            Some(Slot::Running(platform)) => Some(platform.clone()),
            _ => None,
        }
    }

    /// 当前运行中的平台配置
    pub fn running_platforms(&self) -> Vec<PlatformConfig> {
        self.lock()
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Running(_)))
            .map(|(config, _)| config.clone())
            .collect()
    }

    /// 累计创建的平台实例数
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

fn forget_holder(inner: &mut Inner, config: &PlatformConfig, holder_id: HolderId) -> bool {
    let Some(set) = inner.holders.get_mut(config) else {
        return false;
    };
    let removed = set.remove(&holder_id);
    if set.is_empty() {
        inner.holders.remove(config);
    }
    removed
}

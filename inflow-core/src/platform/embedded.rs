//! 内存版平台（EmbeddedPlatform）
//!
//! 基于 `tokio::sync::mpsc` 的按地址路由事件总线：
//! - 每个消费者一个有界通道与一个分发任务，处理回调在分发任务上执行；
//! - `publish` 广播给地址上的全部消费者，`send` 在消费者之间轮询投递一个；
//! - 通道已满时丢弃该消费者的本次投递并告警，不阻塞发布方；
//! - 关闭平台会取消全部消费者。
//!
//! 典型用途：嵌入式部署、示例与测试。
//!
use super::{EventBus, MessageHandler, Platform, PlatformFactory, PlatformHandle, Subscription};
use crate::config::PlatformConfig;
use crate::error::{InflowError, InflowResult};
use crate::message::Message;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Consumer {
    token: CancellationToken,
    tx: mpsc::Sender<Message>,
}

impl Consumer {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.tx.is_closed()
    }
}

/// 内存事件总线
pub struct EmbeddedEventBus {
    platform_id: String,
    consumers: DashMap<String, Vec<Consumer>>,
    root: CancellationToken,
    handle: Handle,
    capacity: usize,
    cursor: AtomicUsize,
}

impl EmbeddedEventBus {
    fn new(platform_id: String, capacity: usize, handle: Handle) -> Self {
        Self {
            platform_id,
            consumers: DashMap::new(),
            root: CancellationToken::new(),
            handle,
            capacity,
            cursor: AtomicUsize::new(0),
        }
    }

    fn ensure_running(&self) -> InflowResult<()> {
        if self.root.is_cancelled() {
            return Err(InflowError::PlatformStopped {
                platform: self.platform_id.clone(),
            });
        }
        Ok(())
    }

    /// 地址上仍有效的消费者数量
    pub fn consumer_count(&self, address: &str) -> usize {
        self.consumers
            .get(address)
            .map(|list| list.iter().filter(|c| c.is_live()).count())
            .unwrap_or(0)
    }

    fn close(&self) {
        self.root.cancel();
        self.consumers.clear();
    }
}

impl EventBus for EmbeddedEventBus {
    fn consumer(&self, address: &str, handler: MessageHandler) -> InflowResult<Subscription> {
        self.ensure_running()?;

        let token = self.root.child_token();
        let (tx, mut rx) = mpsc::channel::<Message>(self.capacity);
        self.consumers
            .entry(address.to_owned())
            .or_default()
            .push(Consumer {
                token: token.clone(),
                tx,
            });

        let task_token = token.clone();
        let task_address = address.to_owned();
        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(message) => {
                            if let Err(err) = handler(message) {
                                error!(address = %task_address, error = %err, "message handler failed");
                            }
                        }
                        None => break,
                    }
                }
            }
            debug!(address = %task_address, "consumer dispatch stopped");
        });

        Ok(Subscription::new(address, token))
    }

    fn publish(&self, message: Message) -> InflowResult<usize> {
        self.ensure_running()?;

        let Some(mut list) = self.consumers.get_mut(message.address()) else {
            return Ok(0);
        };
        list.retain(Consumer::is_live);

        let mut delivered = 0;
        for consumer in list.iter() {
            match consumer.tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(address = message.address(), "consumer buffer full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        Ok(delivered)
    }

    fn send(&self, message: Message) -> InflowResult<bool> {
        self.ensure_running()?;

        let Some(mut list) = self.consumers.get_mut(message.address()) else {
            return Ok(false);
        };
        list.retain(Consumer::is_live);
        if list.is_empty() {
            return Ok(false);
        }

        let len = list.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        let mut pending = Some(message);
        for offset in 0..len {
            let Some(message) = pending.take() else { break };
            match list[(start + offset) % len].tx.try_send(message) {
                Ok(()) => return Ok(true),
                Err(TrySendError::Full(m)) | Err(TrySendError::Closed(m)) => pending = Some(m),
            }
        }
        if let Some(message) = pending {
            warn!(address = message.address(), "no consumer accepted the message");
        }
        Ok(false)
    }
}

/// 内存版平台实例
pub struct EmbeddedPlatform {
    config: PlatformConfig,
    bus: EmbeddedEventBus,
}

impl EmbeddedPlatform {
    pub fn new(config: &PlatformConfig, handle: Handle) -> Self {
        let platform_id = format!("{}-{}", config.name, Uuid::new_v4().simple());
        Self {
            config: config.clone(),
            bus: EmbeddedEventBus::new(platform_id, config.event_bus_capacity, handle),
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn bus(&self) -> &EmbeddedEventBus {
        &self.bus
    }
}

#[async_trait]
impl Platform for EmbeddedPlatform {
    fn platform_id(&self) -> &str {
        &self.bus.platform_id
    }

    fn event_bus(&self) -> &dyn EventBus {
        &self.bus
    }

    fn is_running(&self) -> bool {
        !self.bus.root.is_cancelled()
    }

    async fn shutdown(&self) {
        if self.is_running() {
            self.bus.close();
            info!(platform_id = self.platform_id(), "embedded platform stopped");
        }
    }
}

/// 内存版平台工厂
///
/// 可配置启动延迟（模拟集群加入耗时）与启动失败（故障注入）。
#[derive(Default)]
pub struct EmbeddedPlatformFactory {
    start_delay: Duration,
    failure: Option<String>,
    started: AtomicUsize,
}

impl EmbeddedPlatformFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// 每次启动都以 `reason` 失败
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// 成功启动的平台数量
    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformFactory for EmbeddedPlatformFactory {
    async fn start(&self, config: &PlatformConfig) -> anyhow::Result<PlatformHandle> {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        if let Some(reason) = &self.failure {
            anyhow::bail!("{reason}");
        }

        let platform = EmbeddedPlatform::new(config, Handle::try_current()?);
        self.started.fetch_add(1, Ordering::SeqCst);
        info!(
            platform_id = platform.platform_id(),
            clustered = config.clustered,
            "embedded platform started"
        );
        Ok(Arc::new(platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder() -> (MessageHandler, Arc<Mutex<Vec<Message>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: MessageHandler = Arc::new(move |m| {
            sink.lock().unwrap().push(m);
            Ok(())
        });
        (handler, seen)
    }

    async fn wait_for(seen: &Arc<Mutex<Vec<Message>>>, n: usize) {
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while seen.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
    }

    async fn platform() -> PlatformHandle {
        EmbeddedPlatformFactory::new()
            .start(&PlatformConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn publish_fans_out_by_address() {
        let platform = platform().await;
        let bus = platform.event_bus();
        let (h1, seen1) = recorder();
        let (h2, seen2) = recorder();
        let (h3, seen3) = recorder();
        let _s1 = bus.consumer("a", h1).unwrap();
        let _s2 = bus.consumer("a", h2).unwrap();
        let _s3 = bus.consumer("b", h3).unwrap();

        let delivered = bus.publish(Message::new("a", json!({"n": 1}))).unwrap();
        assert_eq!(delivered, 2);

        wait_for(&seen1, 1).await;
        wait_for(&seen2, 1).await;
        assert_eq!(seen1.lock().unwrap()[0].body(), &json!({"n": 1}));
        assert_eq!(seen2.lock().unwrap().len(), 1);
        assert!(seen3.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_round_robins_between_consumers() {
        let platform = platform().await;
        let bus = platform.event_bus();
        let (h1, seen1) = recorder();
        let (h2, seen2) = recorder();
        let _s1 = bus.consumer("work", h1).unwrap();
        let _s2 = bus.consumer("work", h2).unwrap();

        for i in 0..4 {
            assert!(bus.send(Message::new("work", json!(i))).unwrap());
        }
        wait_for(&seen1, 2).await;
        wait_for(&seen2, 2).await;
        assert_eq!(seen1.lock().unwrap().len(), 2);
        assert_eq!(seen2.lock().unwrap().len(), 2);
        assert!(!bus.send(Message::new("nobody", json!(null))).unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unregistered_consumer_receives_nothing() {
        let platform = platform().await;
        let bus = platform.event_bus();
        let (h, seen) = recorder();
        let sub = bus.consumer("a", h).unwrap();
        sub.unregister();

        assert!(!sub.is_registered());
        assert_eq!(bus.publish(Message::new("a", json!(1))).unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_rejects_further_use() {
        let platform = platform().await;
        platform.shutdown().await;
        platform.shutdown().await;

        assert!(!platform.is_running());
        let (h, _seen) = recorder();
        assert!(matches!(
            platform.event_bus().consumer("a", h),
            Err(InflowError::PlatformStopped { .. })
        ));
        assert!(platform.event_bus().publish(Message::new("a", json!(1))).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_factory_reports_reason() {
        let factory = EmbeddedPlatformFactory::new().failing("no cluster manager");
        let err = factory.start(&PlatformConfig::default()).await.err().unwrap();
        assert_eq!(err.to_string(), "no cluster manager");
        assert_eq!(factory.started_count(), 0);
    }
}

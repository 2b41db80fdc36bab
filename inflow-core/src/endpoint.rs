//! 消息端点（MessageEndpoint）与端点工厂（EndpointFactory）
//!
//! 端点由容器提供并管理，本层只通过 `on_message` 能力与其交互；
//! 端点工厂在每次成功装配订阅时被调用一次，且从不传入事务。
//!
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// 容器侧的事务上下文
///
/// 由容器构造并传给自身的 `EndpointFactory` 实现；激活装配订阅时始终传入 `None`，
/// 投递不参与事务。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    xid: String,
}

impl Transaction {
    pub fn new(xid: impl Into<String>) -> Self {
        Self { xid: xid.into() }
    }

    /// 事务标识
    pub fn xid(&self) -> &str {
        &self.xid
    }
}

/// 消息端点：处理单条入站消息
#[async_trait]
pub trait MessageEndpoint: Send + Sync {
    /// 处理消息；失败的确认与重投由端点及容器负责
    async fn on_message(&self, message: &Message) -> anyhow::Result<()>;

    /// 端点不再使用时由激活释放
    fn release(&self) {}
}

/// 端点工厂：为一次激活创建端点实例
pub trait EndpointFactory: Send + Sync {
    fn create_endpoint(
        &self,
        transaction: Option<Transaction>,
    ) -> anyhow::Result<Arc<dyn MessageEndpoint>>;
}

/// 以闭包形式提供端点的工厂，便于测试与嵌入式使用
pub struct FnEndpointFactory<F> {
    f: F,
}

impl<F> FnEndpointFactory<F>
where
    F: Fn() -> anyhow::Result<Arc<dyn MessageEndpoint>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EndpointFactory for FnEndpointFactory<F>
where
    F: Fn() -> anyhow::Result<Arc<dyn MessageEndpoint>> + Send + Sync,
{
    fn create_endpoint(
        &self,
        _transaction: Option<Transaction>,
    ) -> anyhow::Result<Arc<dyn MessageEndpoint>> {
        (self.f)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct NoopEndpoint;

    #[async_trait]
    impl MessageEndpoint for NoopEndpoint {
        async fn on_message(&self, _message: &Message) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// 记录容器传入事务的工厂
    #[derive(Default)]
    struct TransactionAwareFactory {
        seen: Mutex<Vec<Option<String>>>,
    }

    impl EndpointFactory for TransactionAwareFactory {
        fn create_endpoint(
            &self,
            transaction: Option<Transaction>,
        ) -> anyhow::Result<Arc<dyn MessageEndpoint>> {
            self.seen
                .lock()
                .unwrap()
                .push(transaction.as_ref().map(|tx| tx.xid().to_owned()));
            Ok(Arc::new(NoopEndpoint))
        }
    }

    #[test]
    fn factory_sees_container_transaction() {
        let factory = TransactionAwareFactory::default();
        factory.create_endpoint(Some(Transaction::new("xid-1"))).unwrap();
        factory.create_endpoint(None).unwrap();

        assert_eq!(
            factory.seen.lock().unwrap().as_slice(),
            &[Some("xid-1".to_owned()), None]
        );
    }

    #[test]
    fn closure_factory_ignores_transaction() {
        let factory = FnEndpointFactory::new(|| Ok(Arc::new(NoopEndpoint) as Arc<dyn MessageEndpoint>));
        assert!(factory.create_endpoint(Some(Transaction::new("xid-2"))).is_ok());
    }
}

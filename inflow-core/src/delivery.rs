//! 投递桥（DeliveryBridge）与工作项（HandleMessage）
//!
//! 桥在平台的分发任务上执行，只负责把每条消息包装成工作项交给工作池，不做任何阻塞处理；
//! 提交被拒绝时返回致命错误，本层不排队也不重试。
//!
use crate::endpoint::MessageEndpoint;
use crate::error::{InflowError, InflowResult};
use crate::message::Message;
use crate::platform::MessageHandler;
use crate::work::{Work, WorkManager};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

/// 投递桥：入站消息 → 工作项
#[derive(Clone)]
pub struct DeliveryBridge {
    address: String,
    endpoint: Arc<dyn MessageEndpoint>,
    work_manager: Arc<dyn WorkManager>,
}

impl DeliveryBridge {
    pub fn new(
        address: impl Into<String>,
        endpoint: Arc<dyn MessageEndpoint>,
        work_manager: Arc<dyn WorkManager>,
    ) -> Self {
        Self {
            address: address.into(),
            endpoint,
            work_manager,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// 为一条消息提交一个工作项
    pub fn handle(&self, message: Message) -> InflowResult<()> {
        let work = HandleMessage::new(self.endpoint.clone(), message);
        self.work_manager
            .schedule_work(Box::new(work))
            .map_err(|source| {
                error!(address = %self.address, error = %source, "work rejected, message not delivered");
                InflowError::WorkRejected {
                    address: self.address.clone(),
                    source,
                }
            })
    }

    /// 转换为可注册到事件总线的回调
    pub fn into_handler(self) -> MessageHandler {
        Arc::new(move |message| self.handle(message).map_err(anyhow::Error::from))
    }
}

/// 工作项：以捕获的消息调用端点一次
pub struct HandleMessage {
    endpoint: Arc<dyn MessageEndpoint>,
    message: Message,
}

impl HandleMessage {
    pub fn new(endpoint: Arc<dyn MessageEndpoint>, message: Message) -> Self {
        Self { endpoint, message }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

#[async_trait]
impl Work for HandleMessage {
    async fn run(&self) {
        if let Err(err) = self.endpoint.on_message(&self.message).await {
            warn!(
                address = self.message.address(),
                message_id = %self.message.message_id(),
                error = %err,
                "endpoint failed to handle message"
            );
        }
    }
}

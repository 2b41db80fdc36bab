/// 内存平台投递示例
/// 展示 Activation -> 共享平台 -> 投递桥 -> 工作池 -> 端点 的完整链路，以及最后一个持有者停止后平台关闭
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use inflow_core::endpoint::FnEndpointFactory;
use inflow_core::platform::EmbeddedPlatformFactory;
use inflow_core::{
    Activation, ActivationSpec, EndpointFactory, Message, MessageEndpoint, PlatformConfig, PlatformRegistry,
    TokioWorkManager, WorkManagerConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct PrintEndpoint {
    name: &'static str,
}

#[async_trait]
impl MessageEndpoint for PrintEndpoint {
    async fn on_message(&self, message: &Message) -> anyhow::Result<()> {
        println!(
            "[{}] address={} body={}",
            self.name,
            message.address(),
            message.body()
        );
        Ok(())
    }
}

fn endpoint(name: &'static str) -> Arc<dyn EndpointFactory> {
    Arc::new(FnEndpointFactory::new(move || {
        Ok(Arc::new(PrintEndpoint { name }) as Arc<dyn MessageEndpoint>)
    }))
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let registry = Arc::new(PlatformRegistry::new(Arc::new(EmbeddedPlatformFactory::new())));
    let work_manager = Arc::new(TokioWorkManager::current(WorkManagerConfig::default())?);
    let platform = PlatformConfig::builder().name("embedded").build();

    let orders = Activation::new(
        ActivationSpec::builder()
            .address("orders")
            .platform(platform.clone())
            .build(),
        endpoint("orders"),
        registry.clone(),
        work_manager.clone(),
    );
    let audit = Activation::new(
        ActivationSpec::builder()
            .address("audit")
            .platform(platform.clone())
            .build(),
        endpoint("audit"),
        registry.clone(),
        work_manager.clone(),
    );

    orders.start().await?;
    audit.start().await?;
    println!("holders={}", registry.holder_count(&platform));

    if let Some(p) = orders.platform() {
        p.event_bus().publish(Message::new("orders", json!({"id": 1})))?;
        p.event_bus().publish(Message::new("audit", json!({"event": "login"})))?;
        p.event_bus().send(Message::new("orders", json!({"id": 2})))?;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    orders.stop().await;
    println!("after orders.stop running={}", registry.is_running(&platform));
    audit.stop().await;
    println!("after audit.stop running={}", registry.is_running(&platform));

    work_manager.shutdown().await;
    Ok(())
}

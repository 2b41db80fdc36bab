/// 资源适配器示例：容器视角的端点激活/停用，以及集群模式下的异步平台就绪
use async_trait::async_trait;
use inflow_adapter::{ResourceAdapter, ResourceAdapterConfig};
use inflow_core::endpoint::FnEndpointFactory;
use inflow_core::platform::EmbeddedPlatformFactory;
use inflow_core::{ActivationSpec, EndpointFactory, Message, MessageEndpoint};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Listener;

#[async_trait]
impl MessageEndpoint for Listener {
    async fn on_message(&self, message: &Message) -> anyhow::Result<()> {
        println!("onMessage: {} -> {}", message.address(), message.body());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let ra = ResourceAdapter::new(
        ResourceAdapterConfig::default(),
        Arc::new(EmbeddedPlatformFactory::new().with_start_delay(Duration::from_millis(100))),
    )?;

    // 部署元数据中的激活配置
    let spec = ActivationSpec::from_json(&json!({
        "address": "inbound.queue",
        "platform": { "name": "cluster-a", "clustered": true, "cluster_host": "127.0.0.1", "cluster_port": 15701 }
    }))?;
    let factory: Arc<dyn EndpointFactory> = Arc::new(FnEndpointFactory::new(|| {
        Ok(Arc::new(Listener) as Arc<dyn MessageEndpoint>)
    }));

    let key = ra.endpoint_activation(factory, spec).await?;
    let activation = ra.activation(key).ok_or("activation missing")?;
    println!("state after start: {:?}", activation.state());

    while !activation.is_delivery_active() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    println!("state after readiness: {:?}", activation.state());

    if let Some(platform) = activation.platform() {
        platform
            .event_bus()
            .publish(Message::new("inbound.queue", json!({"hello": "world"})))?;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    ra.endpoint_deactivation(key).await?;
    ra.stop().await;
    Ok(())
}

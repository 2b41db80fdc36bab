use anyhow::Result as AnyResult;
use async_trait::async_trait;
use inflow_adapter::{AdapterError, ResourceAdapter, ResourceAdapterConfig};
use inflow_core::endpoint::FnEndpointFactory;
use inflow_core::platform::EmbeddedPlatformFactory;
use inflow_core::{ActivationSpec, EndpointFactory, InflowError, Message, MessageEndpoint, PlatformConfig};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingEndpoint {
    handled: AtomicUsize,
}

#[async_trait]
impl MessageEndpoint for CountingEndpoint {
    async fn on_message(&self, _message: &Message) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn factory(endpoint: &Arc<CountingEndpoint>) -> Arc<dyn EndpointFactory> {
    let endpoint = endpoint.clone();
    Arc::new(FnEndpointFactory::new(move || {
        Ok(endpoint.clone() as Arc<dyn MessageEndpoint>)
    }))
}

fn spec(address: &str) -> ActivationSpec {
    ActivationSpec::builder()
        .address(address)
        .platform(PlatformConfig::builder().name("ra").build())
        .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn activation_and_deactivation_round_trip() -> AnyResult<()> {
    let ra = ResourceAdapter::new(
        ResourceAdapterConfig::default(),
        Arc::new(EmbeddedPlatformFactory::new()),
    )?;
    let endpoint = Arc::new(CountingEndpoint::default());

    let key = ra.endpoint_activation(factory(&endpoint), spec("jobs")).await?;
    assert_eq!(ra.activations(), vec![key]);
    let platform_cfg = PlatformConfig::builder().name("ra").build();
    assert_eq!(ra.platform_registry().holder_count(&platform_cfg), 1);

    let activation = ra.activation(key).expect("registered activation");
    let bus_platform = activation.platform().expect("platform");
    for i in 0..3 {
        bus_platform.event_bus().publish(Message::new("jobs", json!(i)))?;
    }
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while endpoint.handled.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert_eq!(endpoint.handled.load(Ordering::SeqCst), 3);

    ra.endpoint_deactivation(key).await?;
    assert!(ra.activations().is_empty());
    assert!(!ra.platform_registry().is_running(&platform_cfg));

    let again = ra.endpoint_deactivation(key).await.unwrap_err();
    assert!(matches!(again, AdapterError::ActivationNotFound(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_spec_is_rejected_without_registration() -> AnyResult<()> {
    let ra = ResourceAdapter::new(
        ResourceAdapterConfig::default(),
        Arc::new(EmbeddedPlatformFactory::new()),
    )?;

    let err = ra
        .endpoint_activation(factory(&Arc::default()), ActivationSpec::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Inflow(InflowError::InvalidConfig { .. })));
    assert!(ra.activations().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_deactivates_everything_and_refuses_new_work() -> AnyResult<()> {
    let ra = ResourceAdapter::new(
        ResourceAdapterConfig::builder().shutdown_timeout_ms(500).build(),
        Arc::new(EmbeddedPlatformFactory::new()),
    )?;
    let endpoint = Arc::new(CountingEndpoint::default());
    ra.endpoint_activation(factory(&endpoint), spec("a")).await?;
    ra.endpoint_activation(factory(&endpoint), spec("b")).await?;
    assert_eq!(ra.activations().len(), 2);

    ra.stop().await;
    ra.stop().await;

    assert!(ra.is_stopped());
    assert!(ra.activations().is_empty());
    assert!(ra.platform_registry().running_platforms().is_empty());
    let err = ra
        .endpoint_activation(factory(&endpoint), spec("c"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::Stopped));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn activation_finishing_after_stop_is_deactivated() -> AnyResult<()> {
    let ra = Arc::new(ResourceAdapter::new(
        ResourceAdapterConfig::builder().shutdown_timeout_ms(500).build(),
        Arc::new(EmbeddedPlatformFactory::new().with_start_delay(Duration::from_millis(200))),
    )?);
    let endpoint = Arc::new(CountingEndpoint::default());

    let activating = tokio::spawn({
        let ra = ra.clone();
        let factory = factory(&endpoint);
        async move { ra.endpoint_activation(factory, spec("late")).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    ra.stop().await;

    let err = activating.await?.unwrap_err();
    assert!(matches!(err, AdapterError::Stopped));
    assert!(ra.activations().is_empty());
    assert!(ra.platform_registry().running_platforms().is_empty());
    Ok(())
}

#[test]
fn config_from_json_uses_defaults_for_missing_fields() {
    let cfg = ResourceAdapterConfig::from_json(&json!({ "shutdown_timeout_ms": 250 })).unwrap();
    assert_eq!(cfg.shutdown_timeout(), Duration::from_millis(250));
    assert_eq!(cfg.work.max_concurrent_work, 64);
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use ulid::Ulid;

use rota::dispatcher::{Dispatcher, DispatcherConfig};
use rota::model::{Channel, EventCategory};
use rota::repo::{NotificationSender, SendError};
use rota::store::MemoryStore;

/// Stand-in transport that logs instead of delivering. Deployments
/// inject a real SMTP/web-push sender behind the same trait.
struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(
        &self,
        user_id: Ulid,
        channel: Channel,
        category: EventCategory,
        payload: &serde_json::Value,
    ) -> Result<(), SendError> {
        info!(
            "notify {user_id} via {} [{}]: {payload}",
            channel.label(),
            category.label()
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("ROTA_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    rota::observability::init(metrics_port);

    let tick_secs: u64 = std::env::var("ROTA_TICK_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);
    let claim_page: usize = std::env::var("ROTA_CLAIM_PAGE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(128);
    let utc_offset_min: i32 = std::env::var("ROTA_UTC_OFFSET_MIN")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        Arc::new(LogSender),
        DispatcherConfig {
            tick: Duration::from_secs(tick_secs),
            claim_page,
            utc_offset_min,
        },
    ));

    info!("rota dispatcher starting");
    info!("  tick: {tick_secs}s");
    info!("  claim_page: {claim_page}");
    info!("  utc_offset_min: {utc_offset_min}");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    let worker = tokio::spawn(dispatcher.run());

    // Stop ticking on SIGTERM/ctrl-c.
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    shutdown.await;

    info!("shutdown signal received");
    worker.abort();
    info!("rota stopped");
    Ok(())
}

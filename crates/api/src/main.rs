use std::sync::Arc;

use anyhow::Context;

use chunkflow_ai::{CompletionClient, HttpCompletionClient, HttpCompletionConfig};
use chunkflow_core::EngineConfig;
use chunkflow_observability::{MetricsSink, TracingMetricsSink};

const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chunkflow_observability::init();

    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    let http_config = HttpCompletionConfig::from_env().context("invalid completion service configuration")?;

    // The blocking client owns an internal runtime; build it off the async one.
    let client = tokio::task::spawn_blocking(move || HttpCompletionClient::new(http_config))
        .await
        .context("completion client setup panicked")?
        .context("failed to build completion client")?;
    let client: Arc<dyn CompletionClient> = Arc::new(client);
    let metrics: Arc<dyn MetricsSink> = Arc::new(TracingMetricsSink);

    let services = chunkflow_api::app::services::build_services(config, client, metrics)
        .context("failed to start job engine")?;
    let app = chunkflow_api::app::build_app(services);

    let port = match std::env::var("PORT") {
        Ok(raw) => raw.parse::<u16>().with_context(|| format!("invalid PORT {raw:?}"))?,
        Err(_) => DEFAULT_PORT,
    };
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{port}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use chunkflow_ai::CompletionClient;
use chunkflow_core::{CoreError, EngineConfig};
use chunkflow_infra::JobScheduler;
use chunkflow_observability::MetricsSink;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppServices {
    pub scheduler: JobScheduler,
    /// Idle interval before an SSE `ping`.
    pub heartbeat: Duration,
}

impl AppServices {
    pub fn new(scheduler: JobScheduler) -> Self {
        let heartbeat = scheduler.config().heartbeat_interval();
        Self { scheduler, heartbeat }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

/// Wire the engine from configuration and a completion client.
pub fn build_services(
    config: EngineConfig,
    client: Arc<dyn CompletionClient>,
    metrics: Arc<dyn MetricsSink>,
) -> Result<AppServices, CoreError> {
    let scheduler = JobScheduler::new(config, client, metrics)?;
    Ok(AppServices::new(scheduler))
}

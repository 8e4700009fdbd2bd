//! Live job progress over Server-Sent Events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, sse::{Event as SseEvent, Sse}},
};
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use chunkflow_events::FeedItem;

use crate::app::errors;
use crate::app::services::AppServices;

/// GET /jobs/:id/events
///
/// SSE event names match the event `type`: `started`, `progress`, `error`,
/// `final`, plus `ping` after a heartbeat interval without events. The
/// stream ends after `final`.
pub async fn stream_job_events(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Some(mut subscription) = services.scheduler.registry().subscribe(job_id) else {
        return errors::job_not_found(job_id);
    };
    let heartbeat = services.heartbeat;

    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();

    // The feed blocks on a std channel, so forward from a blocking task.
    tokio::task::spawn_blocking(move || {
        loop {
            let sse_event = match subscription.next_item(heartbeat) {
                FeedItem::Event(event) => {
                    let data = match serde_json::to_string(&event) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(job_id = %job_id, error = %e, "failed to encode job event");
                            continue;
                        }
                    };
                    SseEvent::default().event(event.kind()).data(data)
                }
                FeedItem::Ping => SseEvent::default().event("ping").data("{}"),
                FeedItem::Closed => break,
            };

            if tx.send(Ok(sse_event)).is_err() {
                tracing::debug!(job_id = %job_id, "event stream client disconnected");
                break;
            }
        }
    });

    Sse::new(UnboundedReceiverStream::new(rx)).into_response()
}

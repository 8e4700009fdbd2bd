use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use chunkflow_ai::{CompletionClient, CompletionError, ScriptedCompletionClient};
use chunkflow_api::app::{AppServices, build_app};
use chunkflow_chunker::{Chunker, TokenEstimator};
use chunkflow_core::EngineConfig;
use chunkflow_infra::JobScheduler;
use chunkflow_observability::{MetricsSink, NoopMetricsSink};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(client: ScriptedCompletionClient) -> Self {
        let config = EngineConfig {
            retry_base_delay_seconds: 0.001,
            retry_jitter_seconds: 0.0,
            ..EngineConfig::default()
        };
        let client: Arc<dyn CompletionClient> = Arc::new(client);
        let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetricsSink);
        let scheduler = JobScheduler::new(config, client, metrics)
            .expect("valid config")
            .with_chunker(Chunker::new(1, TokenEstimator::heuristic()));
        let services = AppServices::new(scheduler).with_heartbeat(Duration::from_millis(50));

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn submit(client: &reqwest::Client, base_url: &str, body: Value) -> String {
    let res = client
        .post(format!("{}/jobs", base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let created: Value = res.json().await.unwrap();
    created["job_id"].as_str().unwrap().to_string()
}

async fn get_job_eventually(client: &reqwest::Client, base_url: &str, id: &str) -> Value {
    // Jobs run in the background; poll until terminal.
    for _ in 0..200 {
        let res = client
            .get(format!("{}/jobs/{}", base_url, id))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body: Value = res.json().await.unwrap();
        if body["status"] == "succeeded" || body["status"] == "failed" {
            return body;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("job {id} did not finish within timeout");
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn(ScriptedCompletionClient::new()).await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn submitted_job_can_be_polled_to_completion() {
    let scripted = ScriptedCompletionClient::new()
        .script("aaaa", [Ok("Corrected text:\nAAAA".to_string())])
        .script(
            "bbbb",
            [Err(CompletionError::status(503, "busy")), Ok("BBBB".to_string())],
        );
    let srv = TestServer::spawn(scripted).await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv.base_url, json!({ "text": "aaaa\n\nbbbb" })).await;
    let job = get_job_eventually(&client, &srv.base_url, &id).await;

    assert_eq!(job["id"], id.as_str());
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["mode"], "grammar");
    assert_eq!(job["chunks_total"], 2);
    assert_eq!(job["chunks_completed"], 2);
    assert_eq!(job["progress_percent"], 100);
    assert_eq!(job["result"], "AAAA\nBBBB");
    assert!(job["error"].is_null());
    assert_eq!(job["metrics"].as_array().unwrap().len(), 2);

    let res = client.get(format!("{}/jobs", srv.base_url)).send().await.unwrap();
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_submissions_are_bad_requests() {
    let srv = TestServer::spawn(ScriptedCompletionClient::new()).await;
    let client = reqwest::Client::new();

    for body in [
        json!({ "text": "" }),
        json!({ "text": "   " }),
        json!({ "text": "Hallo", "mode": "translate" }),
        json!({ "text": "Hallo", "mode": "translate", "target_language": "" }),
    ] {
        let res = client
            .post(format!("{}/jobs", srv.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
    }
}

#[tokio::test]
async fn unknown_and_malformed_job_ids() {
    let srv = TestServer::spawn(ScriptedCompletionClient::new()).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/jobs/{}", srv.base_url, "0190c5a8-6e5c-7cc0-8000-000000000000"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/jobs/{}/events", srv.base_url, "0190c5a8-6e5c-7cc0-8000-000000000000"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/jobs/not-a-uuid", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sync_endpoint_returns_result_or_bad_gateway() {
    let scripted = ScriptedCompletionClient::new()
        .script("fixme", [Ok("```\nFixed.\n```".to_string())])
        .script("nope", [Err(CompletionError::status(400, "content filtered"))]);
    let srv = TestServer::spawn(scripted).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/jobs/sync", srv.base_url))
        .json(&json!({ "text": "fixme" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["result"], "Fixed.");

    let res = client
        .post(format!("{}/jobs/sync", srv.base_url))
        .json(&json!({ "text": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "job_failed");
    assert!(body["message"].as_str().unwrap().contains("status 400"));
}

#[tokio::test]
async fn event_stream_ends_with_final() {
    let srv = TestServer::spawn(ScriptedCompletionClient::new()).await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv.base_url, json!({ "text": "aaaa\n\nbbbb\n\ncccc" })).await;

    let res = client
        .get(format!("{}/jobs/{}/events", srv.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // The body completes once the server closes the stream after `final`.
    let body = tokio::time::timeout(Duration::from_secs(10), res.text())
        .await
        .expect("stream did not end")
        .unwrap();

    let body = body.replace("event: ", "event:");
    let started = body.find("event:started").expect("started event");
    let finished = body.find("event:final").expect("final event");
    assert!(started < finished);
    assert_eq!(body.matches("event:progress").count(), 3);
    assert_eq!(body.matches("event:final").count(), 1);
    assert!(body.contains(r#""status":"succeeded""#));
}

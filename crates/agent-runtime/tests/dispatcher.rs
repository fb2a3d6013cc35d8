use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adno_agent_client::{ConfigVersionStore, ControlPlaneClient};
use adno_agent_core::model::{AgentConfig, AgentTask, WorkerType, WorkspaceConfig};
use adno_agent_runtime::{Dispatcher, HandlerContext, HandlerError, HandlerRegistry, PollOutcome, TaskHandler};
use adno_agent_transport::HttpClientChain;
use async_trait::async_trait;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn task_json(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "type": "fetcher",
        "payload": {},
        "priority": 0,
        "scheduled_at": "2026-01-01T00:00:00Z",
    })
}

fn config(max_concurrent: u32) -> Arc<AgentConfig> {
    Arc::new(AgentConfig {
        version: "v1".into(),
        heartbeat_interval_ms: 60_000,
        task_poll_interval_ms: 300_000,
        max_concurrent_tasks: max_concurrent,
        workers: HashMap::new(),
        limits: serde_json::json!({}),
        version_info: None,
    })
}

fn workspace() -> Arc<WorkspaceConfig> {
    Arc::new(WorkspaceConfig {
        fields: Default::default(),
    })
}

async fn client_for(server: &MockServer) -> Arc<ControlPlaneClient> {
    let chain = Arc::new(
        HttpClientChain::new(
            server.uri().parse().unwrap(),
            "agnt_deadbeefdeadbeefdeadbeefdeadbeef",
        )
        .unwrap(),
    );
    Arc::new(ControlPlaneClient::new(chain, Arc::new(ConfigVersionStore::new())))
}

struct ImmediateHandler;

#[async_trait]
impl TaskHandler for ImmediateHandler {
    async fn handle(
        &self,
        task: AgentTask,
        _ctx: HandlerContext,
    ) -> Result<serde_json::Value, HandlerError> {
        Ok(serde_json::json!({ "task_id": task.id }))
    }
}

struct FailingHandler;

#[async_trait]
impl TaskHandler for FailingHandler {
    async fn handle(
        &self,
        _task: AgentTask,
        _ctx: HandlerContext,
    ) -> Result<serde_json::Value, HandlerError> {
        Err(HandlerError::new("boom"))
    }
}

struct BlockingHandler;

#[async_trait]
impl TaskHandler for BlockingHandler {
    async fn handle(
        &self,
        _task: AgentTask,
        ctx: HandlerContext,
    ) -> Result<serde_json::Value, HandlerError> {
        ctx.cancellation.cancelled().await;
        Ok(serde_json::json!({}))
    }
}

fn registry_with(worker_type: WorkerType, handler: Arc<dyn TaskHandler>) -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry.register(worker_type, handler);
    Arc::new(registry)
}

#[tokio::test]
async fn at_capacity_tick_is_a_success_noop_and_skips_get_tasks() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let dispatcher = Dispatcher::new(client, registry_with(WorkerType::Fetcher, Arc::new(ImmediateHandler)));

    let outcome = dispatcher.poll_once(config(0), workspace()).await;
    assert!(matches!(
        outcome,
        PollOutcome::Success {
            piggyback_config: None
        }
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn claimed_task_is_executed_and_completed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agent/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tasks": [task_json("T1")],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/tasks/T1/claim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json("T1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/tasks/T1/complete"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/signal"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let dispatcher = Dispatcher::new(client, registry_with(WorkerType::Fetcher, Arc::new(ImmediateHandler)));

    let outcome = dispatcher.poll_once(config(2), workspace()).await;
    assert!(matches!(outcome, PollOutcome::Success { .. }));

    let remaining = dispatcher.wait_for_drain(Duration::from_secs(1)).await;
    assert!(remaining.is_empty());

    let completions = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/api/agent/tasks/T1/complete")
        .count();
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn claim_conflict_produces_no_completion_or_failure_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agent/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tasks": [task_json("T1")],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/tasks/T1/claim"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let dispatcher = Dispatcher::new(client, registry_with(WorkerType::Fetcher, Arc::new(ImmediateHandler)));

    dispatcher.poll_once(config(2), workspace()).await;
    let remaining = dispatcher.wait_for_drain(Duration::from_secs(1)).await;
    assert!(remaining.is_empty());

    let side_effects = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path().ends_with("/complete") || r.url.path().ends_with("/fail"))
        .count();
    assert_eq!(side_effects, 0);
}

#[tokio::test]
async fn a_failed_task_reports_a_retryable_failure_and_a_task_failed_signal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agent/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tasks": [task_json("T1")],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/tasks/T1/claim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json("T1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/tasks/T1/fail"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/signal"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let dispatcher = Dispatcher::new(client, registry_with(WorkerType::Fetcher, Arc::new(FailingHandler)));

    dispatcher.poll_once(config(2), workspace()).await;
    let remaining = dispatcher.wait_for_drain(Duration::from_secs(1)).await;
    assert!(remaining.is_empty());

    let fail_call = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/api/agent/tasks/T1/fail")
        .expect("failTask was called");
    let fail_body: serde_json::Value = serde_json::from_slice(&fail_call.body).unwrap();
    assert_eq!(fail_body["retryable"], true);

    let signal_call = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/api/agent/signal")
        .expect("a signal was sent");
    let signals: serde_json::Value = serde_json::from_slice(&signal_call.body).unwrap();
    let signal = &signals[0];
    assert_eq!(signal["category"], "lifecycle");
    assert_eq!(signal["type"], "task_failed");
    assert_eq!(signal["severity"], "error");
}

#[tokio::test]
async fn cancelling_a_blocked_task_reports_a_non_retryable_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agent/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tasks": [task_json("T1")],
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/tasks/T1/claim"))
        .respond_with(ResponseTemplate::new(200).set_body_json(task_json("T1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/tasks/T1/fail"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/signal"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let dispatcher = Dispatcher::new(client, registry_with(WorkerType::Fetcher, Arc::new(BlockingHandler)));

    dispatcher.poll_once(config(2), workspace()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(dispatcher.in_flight_count(), 1);

    dispatcher.cancel_all();
    let remaining = dispatcher.wait_for_drain(Duration::from_secs(1)).await;
    assert!(remaining.is_empty());

    let fail_call = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/api/agent/tasks/T1/fail")
        .expect("failTask was called for the cancelled task");
    let body: serde_json::Value = serde_json::from_slice(&fail_call.body).unwrap();
    assert_eq!(body["retryable"], false);
}

use std::sync::Arc;
use std::time::Duration;

use adno_agent_client::{ConfigVersionStore, ControlPlaneClient};
use adno_agent_runtime::{Dispatcher, SchedulerSet, Supervisor};
use adno_agent_transport::HttpClientChain;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_json(heartbeat_ms: u64) -> serde_json::Value {
    serde_json::json!({
        "version": "v1",
        "heartbeat_interval_ms": heartbeat_ms,
        "task_poll_interval_ms": 3_600_000,
        "max_concurrent_tasks": 2,
        "workers": {},
        "limits": {},
    })
}

async fn mount_baseline(server: &MockServer, heartbeat_ms: u64) {
    Mock::given(method("GET"))
        .and(path("/api/agent/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_json(heartbeat_ms)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agent/workspace-config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agent/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"tasks": []})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/signal"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

fn supervisor_for(server: &MockServer) -> Arc<Supervisor> {
    let chain = Arc::new(
        HttpClientChain::new(
            server.uri().parse().unwrap(),
            "agnt_deadbeefdeadbeefdeadbeefdeadbeef",
        )
        .unwrap(),
    );
    let client = Arc::new(ControlPlaneClient::new(chain, Arc::new(ConfigVersionStore::new())));
    let dispatcher = Arc::new(Dispatcher::new(client.clone(), Arc::new(adno_agent_runtime::noop_registry())));
    let schedulers = Arc::new(SchedulerSet::new(client.clone()));
    Supervisor::new(client, dispatcher, schedulers)
}

fn signal_types(requests: Vec<wiremock::Request>) -> Vec<String> {
    requests
        .into_iter()
        .filter(|r| r.url.path() == "/api/agent/signal")
        .filter_map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).ok())
        .flat_map(|batch| batch.as_array().cloned().unwrap_or_default())
        .map(|s| s["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn start_sends_agent_starting_and_periodic_heartbeats() {
    let server = MockServer::start().await;
    mount_baseline(&server, 40).await;

    let supervisor = supervisor_for(&server);
    supervisor.start(Default::default()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(130)).await;

    let types = signal_types(server.received_requests().await.unwrap());
    assert!(types.contains(&"agent_starting".to_string()));
    assert!(types.iter().filter(|t| t.as_str() == "heartbeat").count() >= 2);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn a_piggybacked_interval_change_discovered_mid_poll_does_not_hang() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/agent/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_json(3_600_000)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/agent/workspace-config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/agent/signal"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    // The first getTasks piggybacks a config with a much shorter poll
    // interval, discovered from inside the very poll-loop task that is
    // about to reconcile the timer for that new interval.
    let mut faster = config_json(3_600_000);
    faster["task_poll_interval_ms"] = serde_json::json!(20);
    Mock::given(method("GET"))
        .and(path("/api/agent/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tasks": [],
            "config": faster,
        })))
        .mount(&server)
        .await;

    let supervisor = supervisor_for(&server);
    supervisor.start(Default::default()).await.unwrap();

    // If reconciling the new interval ever self-joined the poll-loop task,
    // the loop would hang right here and no further getTasks calls would
    // ever land.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let tasks_calls = server
                .received_requests()
                .await
                .unwrap()
                .into_iter()
                .filter(|r| r.url.path() == "/api/agent/tasks")
                .count();
            if tasks_calls >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("poll loop kept running after a piggybacked interval change");

    supervisor.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_idempotent_and_sends_agent_stopping_once() {
    let server = MockServer::start().await;
    mount_baseline(&server, 3_600_000).await;

    let supervisor = supervisor_for(&server);
    supervisor.start(Default::default()).await.unwrap();

    supervisor.shutdown().await;
    supervisor.shutdown().await;

    let types = signal_types(server.received_requests().await.unwrap());
    let stopping_count = types.iter().filter(|t| t.as_str() == "agent_stopping").count();
    assert_eq!(stopping_count, 1);
}

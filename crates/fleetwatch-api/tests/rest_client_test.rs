// Integration tests for `RestClient` using wiremock.
#![allow(clippy::unwrap_used)]

use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleetwatch_api::{Error, RestClient, TransportConfig, WireId};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let base = format!("{}/api", server.uri()).parse().unwrap();
    let client = RestClient::with_client(reqwest::Client::new(), base);
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_list_containers() {
    let (server, client) = setup().await;

    let body = json!([
        {
            "containerId": 1,
            "containerName": "web",
            "agentName": "edge-01",
            "cpuPercent": 12.5,
            "memoryUsage": 268_435_456u64,
            "state": "running",
            "health": "healthy"
        },
        { "containerId": "db-7", "name": "postgres", "state": "exited" }
    ]);

    Mock::given(method("GET"))
        .and(path("/api/containers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let containers = client.list_containers().await.unwrap();

    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].container_id, Some(WireId::Number(1)));
    assert_eq!(containers[0].container_name.as_deref(), Some("web"));
    assert_eq!(containers[0].memory_usage, Some(268_435_456));
    assert_eq!(containers[1].container_id, Some(WireId::Text("db-7".into())));
    assert_eq!(containers[1].container_name.as_deref(), Some("postgres"));
}

#[tokio::test]
async fn test_list_agents() {
    let (server, client) = setup().await;

    let body = json!([
        { "agentId": 3, "agentName": "edge-01", "status": "ON", "createdAt": "2024-05-01T10:00:00" }
    ]);

    Mock::given(method("GET"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let agents = client.list_agents().await.unwrap();

    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].agent_name.as_deref(), Some("edge-01"));
    assert_eq!(agents[0].status.as_deref(), Some("ON"));
}

#[tokio::test]
async fn test_container_detail() {
    let (server, client) = setup().await;

    let body = json!({
        "containerId": 42,
        "containerName": "cache",
        "image": "redis:7",
        "restartCount": 1,
        "ports": [{ "privatePort": 6379, "publicPort": 16379, "type": "tcp" }]
    });

    Mock::given(method("GET"))
        .and(path("/api/containers/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let detail = client.container_detail("42").await.unwrap();

    assert_eq!(detail.summary.container_name.as_deref(), Some("cache"));
    assert_eq!(detail.image.as_deref(), Some("redis:7"));
    assert_eq!(detail.restart_count, Some(1));
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/agents"))
        .and(header("authorization", "Bearer t0ken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let token = SecretString::from("t0ken".to_owned());
    let client = RestClient::new(
        format!("{}/api/", server.uri()).parse().unwrap(),
        Some(&token),
        &TransportConfig::default(),
    )
    .unwrap();

    assert!(client.list_agents().await.unwrap().is_empty());
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/containers"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.list_containers().await.unwrap_err();
    assert!(err.is_auth(), "expected auth error, got {err:?}");
}

#[tokio::test]
async fn test_forbidden_is_auth_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/agents"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    assert!(client.list_agents().await.unwrap_err().is_auth());
}

#[tokio::test]
async fn test_not_found_is_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/containers/999"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such container"))
        .mount(&server)
        .await;

    let err = client.container_detail("999").await.unwrap_err();
    match &err {
        Error::Api { status, message } => {
            assert_eq!(*status, 404);
            assert_eq!(message, "no such container");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/containers"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.list_containers().await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization error, got {other:?}"),
    }
}

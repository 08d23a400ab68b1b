#[path = "common/mod.rs"]
mod common;

use common::{github_arguments, spawn_server, test_config, MockOpenAi, MockReply};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use smartthread::IntegrationSettings;

async fn get(url: String) -> (StatusCode, Value) {
    let resp = Client::new().get(url).send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn api_health_reflects_model_reachability() {
    let mock = MockOpenAi::start(MockReply::tool_call(github_arguments())).await;
    let server = spawn_server(test_config(&mock.base_url)).await;

    let (status, json) = get(server.url("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["services"]["openai"], "connected");
    assert_eq!(json["services"]["server"], "running");
    assert!(json["uptime"].as_f64().unwrap() >= 0.0);

    mock.set_models_ok(false);
    let (status, json) = get(server.url("/api/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["services"]["openai"], "disconnected");

    // liveness never consults the model
    let (status, json) = get(server.url("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_model_is_unhealthy() {
    let server = spawn_server(test_config("http://127.0.0.1:9")).await;
    let (status, json) = get(server.url("/api/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["services"]["openai"], "disconnected");
    server.shutdown().await;
}

#[tokio::test]
async fn stalled_model_endpoint_is_unhealthy_within_client_bound() {
    // accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    let server = spawn_server(test_config(&format!("http://{}", addr))).await;

    let started = std::time::Instant::now();
    let (status, json) = get(server.url("/api/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["services"]["openai"], "disconnected");
    assert!(started.elapsed() < std::time::Duration::from_secs(8));
    server.shutdown().await;
}

#[tokio::test]
async fn modes_lists_all_three_with_examples() {
    let mock = MockOpenAi::start(MockReply::tool_call(github_arguments())).await;
    let server = spawn_server(test_config(&mock.base_url)).await;

    let (status, json) = get(server.url("/api/modes")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["available"], serde_json::json!(["github", "notion", "summary"]));
    for mode in ["github", "notion", "summary"] {
        assert!(json["descriptions"][mode].is_string());
        assert_eq!(json["examples"][mode]["input"]["mode"], mode);
    }
    server.shutdown().await;
}

#[tokio::test]
async fn integrations_report_configuration() {
    let mock = MockOpenAi::start(MockReply::tool_call(github_arguments())).await;
    let mut config = test_config(&mock.base_url);
    config.integrations = IntegrationSettings {
        github_token: Some("ghp_test".into()),
        ..IntegrationSettings::default()
    };
    let server = spawn_server(config).await;

    let (status, json) = get(server.url("/api/integrations")).await;
    assert_eq!(status, StatusCode::OK);
    let list = json["integrations"].as_array().unwrap();
    assert_eq!(list.len(), 4);
    let github = list.iter().find(|i| i["name"] == "github").unwrap();
    assert_eq!(github["configured"], true);
    assert_eq!(github["status"], "available");
    let slack = list.iter().find(|i| i["name"] == "slack").unwrap();
    assert_eq!(slack["status"], "not_configured");
    server.shutdown().await;
}

#[tokio::test]
async fn index_routes_and_unknown_paths() {
    let mock = MockOpenAi::start(MockReply::tool_call(github_arguments())).await;
    let server = spawn_server(test_config(&mock.base_url)).await;

    let (status, json) = get(server.url("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "SmartThread Backend");
    assert_eq!(json["deployment"]["environment"], "test");

    let (status, json) = get(server.url("/api")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "SmartThread API");
    assert_eq!(json["rateLimit"]["requests"], 100);
    assert_eq!(json["maxRequestSize"], "500KB");
    assert_eq!(json["supportedModes"].as_array().unwrap().len(), 3);

    let (status, json) = get(server.url("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert_eq!(json["error"]["message"], "Route GET /api/nope not found");
    server.shutdown().await;
}

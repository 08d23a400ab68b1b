#[path = "common/mod.rs"]
mod common;

use std::convert::Infallible;

use bytes::Bytes;
use common::{github_arguments, spawn_server, test_config, MockOpenAi, MockReply};
use http_body::Frame;
use http_body_util::StreamBody;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio_stream::iter;

fn oversized_payload() -> String {
    json!({
        "thread": [{ "sender": "Alice", "text": "X".repeat(2048) }],
        "mode": "summary"
    })
    .to_string()
}

#[tokio::test]
async fn declared_length_over_limit_returns_413() {
    let mock = MockOpenAi::start(MockReply::tool_call(github_arguments())).await;
    let mut config = test_config(&mock.base_url);
    config.max_request_bytes = 1024;
    let server = spawn_server(config).await;

    let resp = Client::new()
        .post(server.url("/api/process-thread"))
        .header("content-type", "application/json")
        .body(oversized_payload())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "REQUEST_TOO_LARGE");
    assert_eq!(json["error"]["message"], "Request size exceeds 1KB limit");
    assert_eq!(json["error"]["details"]["maxBytes"], 1024);
    assert_eq!(mock.calls(), 0);
    server.shutdown().await;
}

#[tokio::test]
async fn chunked_payload_over_limit_returns_413() {
    let mock = MockOpenAi::start(MockReply::tool_call(github_arguments())).await;
    let mut config = test_config(&mock.base_url);
    config.max_request_bytes = 256;
    let server = spawn_server(config).await;

    let payload = oversized_payload();
    let chunk_bytes: Vec<_> = payload
        .as_bytes()
        .chunks(128)
        .map(Bytes::copy_from_slice)
        .collect();
    let stream = iter(
        chunk_bytes
            .into_iter()
            .map(|chunk| Ok::<_, Infallible>(Frame::data(chunk))),
    );
    let body = reqwest::Body::wrap(StreamBody::new(stream));

    let resp = Client::new()
        .post(server.url("/api/process-thread"))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["code"], "REQUEST_TOO_LARGE");
    assert_eq!(mock.calls(), 0);
    server.shutdown().await;
}

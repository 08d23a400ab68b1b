#[path = "common/mod.rs"]
mod common;

use std::fs;
use std::io::Read;

use common::{github_arguments, spawn_server, test_config, thread_body, MockOpenAi, MockReply};
use flate2::read::GzDecoder;
use serde_json::{json, Value};
use smartthread::telemetry::RotatingWriter;
use smartthread::RotationConfig;

#[tokio::test]
async fn events_are_written_per_request() {
    let temp_dir = tempfile::tempdir().unwrap();
    let combined = temp_dir.path().join("combined.log");
    let errors = temp_dir.path().join("error.log");

    let mock = MockOpenAi::start(MockReply::tool_call(github_arguments())).await;
    let mut config = test_config(&mock.base_url);
    config.log_file = Some(combined.to_str().unwrap().to_string());
    config.error_log_file = Some(errors.to_str().unwrap().to_string());
    let server = spawn_server(config).await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let resp = client
            .post(server.url("/api/process-thread"))
            .header("x-forwarded-for", "203.0.113.7")
            .json(&thread_body("github"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    let resp = client
        .post(server.url("/api/process-thread"))
        .json(&json!({ "thread": [], "mode": "github" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    server.shutdown().await;

    let content = fs::read_to_string(&combined).expect("event log content");
    let lines: Vec<Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["event"], "process_thread");
    assert_eq!(lines[0]["client"], "203.0.113.7");
    assert_eq!(lines[0]["mode"], "github");
    assert_eq!(lines[0]["tokensUsed"], 150);
    assert_eq!(lines[3]["code"], "VALIDATION_ERROR");

    let error_content = fs::read_to_string(&errors).unwrap();
    assert_eq!(error_content.lines().count(), 1);
}

#[test]
fn rotation_keeps_bounded_compressed_backups() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("events.log");
    let rotation = RotationConfig {
        max_bytes: Some(64),
        keep: 2,
        compress: true,
    };
    let mut writer = RotatingWriter::open(&path, &rotation).unwrap();
    for i in 0..20 {
        writer
            .write_line(&format!("{{\"line\":{},\"pad\":\"xxxxxxxxxxxxxxxxxxxx\"}}", i))
            .unwrap();
    }

    let first = temp_dir.path().join("events.log.1.gz");
    let second = temp_dir.path().join("events.log.2.gz");
    assert!(first.exists());
    assert!(second.exists());
    assert!(!temp_dir.path().join("events.log.3.gz").exists());
    assert!(!temp_dir.path().join("events.log.1").exists());

    let mut decoded = String::new();
    GzDecoder::new(fs::File::open(&first).unwrap())
        .read_to_string(&mut decoded)
        .unwrap();
    assert!(decoded.contains("\"line\":"));
    assert!(writer.size() <= 128);
}

#[test]
fn rotation_without_compression_shifts_plain_files() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("events.log");
    let rotation = RotationConfig {
        max_bytes: Some(10),
        keep: 3,
        compress: false,
    };
    let mut writer = RotatingWriter::open(&path, &rotation).unwrap();
    for line in ["first-line", "second-line", "third-line"] {
        writer.write_line(line).unwrap();
    }
    assert_eq!(fs::read_to_string(&path).unwrap(), "third-line\n");
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("events.log.1")).unwrap(),
        "second-line\n"
    );
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("events.log.2")).unwrap(),
        "first-line\n"
    );
}

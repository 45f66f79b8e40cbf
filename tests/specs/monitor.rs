// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor channel: health endpoint, queries, and pushed events.

use super::prelude::*;

use std::time::Duration;

use aether_core::PersistenceMode;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_tungstenite::tungstenite::Message;

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect_ws(server: &aether_daemon::Server) -> Ws {
    let url = format!("ws://127.0.0.1:{}/", server.http_addr.port());
    let (ws, _) = tokio_tungstenite::connect_async(url).await.expect("ws connect");
    ws
}

async fn next_json(ws: &mut Ws, timeout: Duration) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(timeout, ws.next()).await.ok()??.ok()?;
        match message {
            Message::Text(text) => return serde_json::from_str(&text).ok(),
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return None,
        }
    }
}

#[tokio::test]
async fn healthz_answers_plain_http() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut stream =
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", server.http_addr.port()))
            .await
            .unwrap();
    stream
        .write_all(b"GET /healthz HTTP/1.1\r\nhost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    let body = response.split("\r\n\r\n").nth(1).expect("body");
    let health: Value = serde_json::from_str(body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["read_only"], false);

    server.shutdown().await;
}

#[tokio::test]
async fn queries_answer_on_the_websocket() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("greet", "World").await;

    let mut ws = connect_ws(&server).await;

    ws.send(Message::text(json!({"type": "ListAllWorkflows"}).to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut ws, Duration::from_secs(2)).await.expect("reply");
    assert_eq!(reply["type"], "WorkflowList");
    assert_eq!(reply["workflows"].as_array().unwrap().len(), 1);
    assert_eq!(reply["workflows"][0]["workflow_id"], workflow_id.as_str());

    ws.send(Message::text(
        json!({"type": "GetWorkflow", "workflow_id": workflow_id}).to_string(),
    ))
    .await
    .unwrap();
    let reply = next_json(&mut ws, Duration::from_secs(2)).await.expect("reply");
    assert_eq!(reply["type"], "WorkflowDetail");
    assert_eq!(reply["detail"]["workflow_type"], "greet");

    ws.send(Message::text(
        json!({"type": "GetWorkflowHistory", "workflow_id": workflow_id}).to_string(),
    ))
    .await
    .unwrap();
    let reply = next_json(&mut ws, Duration::from_secs(2)).await.expect("reply");
    assert_eq!(reply["type"], "WorkflowHistory");
    assert!(reply["history"].is_array());

    ws.send(Message::text(
        json!({"type": "GetWorkflow", "workflow_id": "wf-missing"}).to_string(),
    ))
    .await
    .unwrap();
    let reply = next_json(&mut ws, Duration::from_secs(2)).await.expect("reply");
    assert_eq!(reply["type"], "Error");

    server.shutdown().await;
}

#[tokio::test]
async fn lifecycle_events_are_pushed_in_order() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    // Subscribe before anything happens.
    let mut ws = connect_ws(&server).await;

    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["greet"]).await;
    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("greet", "World").await;
    let task = worker.poll_until(&session, Duration::from_secs(2)).await;
    worker.complete_ok(&session, &task.task_id, "Hello, World!").await;

    // Collect this workflow's events until it completes.
    let mut kinds = Vec::new();
    while kinds.last().map(String::as_str) != Some("workflow:completed") {
        let event = next_json(&mut ws, Duration::from_secs(2))
            .await
            .expect("event push");
        if event["workflow_id"] == workflow_id.as_str() {
            assert_eq!(event["workflow_type"], "greet");
            assert!(event["timestamp"].as_u64().is_some());
            kinds.push(event["event_type"].as_str().unwrap_or_default().to_string());
        }
    }

    assert_eq!(
        kinds,
        vec![
            "workflow:started",
            "step:started",
            "step:completed",
            "workflow:completed",
        ]
    );

    server.shutdown().await;
}

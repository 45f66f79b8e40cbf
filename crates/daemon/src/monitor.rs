// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor channel: WebSocket queries plus pushed lifecycle events.
//!
//! The http port serves two things: `GET /healthz` as plain HTTP, and a
//! text-framed WebSocket for everything else. Queries are tagged unions
//! (`ListActiveWorkflows`, `ListAllWorkflows`, `GetWorkflow`,
//! `GetWorkflowHistory`); lifecycle events are pushed on the same channel
//! as objects with `event_type`, `workflow_id`, `workflow_type`,
//! `timestamp`, and an event-specific `payload`. A lagging subscriber
//! receives an `events:gap` object and should re-query authoritative
//! state. Subscribers never mutate state.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use aether_core::{EventFilter, LifecycleEvent, WorkflowId};
use aether_engine::{BusItem, EventBus, RuntimeHandle};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::metrics::Metrics;

/// Monitor request shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MonitorRequest {
    ListActiveWorkflows,
    ListAllWorkflows,
    GetWorkflow { workflow_id: String },
    GetWorkflowHistory { workflow_id: String },
}

/// Monitor response shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MonitorResponse {
    WorkflowList {
        workflows: Vec<crate::protocol::WorkflowSummary>,
    },
    WorkflowDetail {
        detail: Box<crate::protocol::WorkflowDetail>,
    },
    WorkflowHistory {
        history: Vec<crate::protocol::StepRecordDetail>,
    },
    Error { message: String },
}

/// Lifecycle event as pushed on the monitor channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub event_type: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub timestamp: u64,
    pub payload: serde_json::Value,
}

impl MonitorEvent {
    pub fn from_lifecycle(event: &LifecycleEvent) -> Self {
        let payload = match event {
            LifecycleEvent::WorkflowStarted { input, .. } => json!({ "input": input }),
            LifecycleEvent::WorkflowCompleted { result, .. } => json!({ "result": result }),
            LifecycleEvent::WorkflowFailed { error, .. } => json!({ "error": error }),
            LifecycleEvent::WorkflowCancelled { .. } => json!({}),
            LifecycleEvent::StepStarted { step, attempt, input, .. } => {
                json!({ "step_name": step, "attempt": attempt, "input": input })
            }
            LifecycleEvent::StepCompleted { step, attempt, output, .. } => {
                json!({ "step_name": step, "attempt": attempt, "output": output })
            }
            LifecycleEvent::StepFailed { step, attempt, error, .. } => {
                json!({ "step_name": step, "attempt": attempt, "error": error })
            }
        };
        Self {
            event_type: event.kind().to_string(),
            workflow_id: event.workflow_id().to_string(),
            workflow_type: event.workflow_type().to_string(),
            timestamp: event.at_ms(),
            payload,
        }
    }

    /// Marker a lagging subscriber receives in place of dropped events.
    pub fn gap(missed: u64) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            event_type: "events:gap".to_string(),
            workflow_id: String::new(),
            workflow_type: String::new(),
            timestamp,
            payload: json!({ "missed": missed }),
        }
    }
}

pub(crate) struct MonitorCtx {
    pub runtime: RuntimeHandle,
    pub bus: EventBus,
    pub metrics: Arc<Metrics>,
    pub shutdown: CancellationToken,
}

pub(crate) struct MonitorServer {
    tcp: TcpListener,
    ctx: Arc<MonitorCtx>,
}

impl MonitorServer {
    pub fn new(tcp: TcpListener, ctx: Arc<MonitorCtx>) -> Self {
        Self { tcp, ctx }
    }

    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => {
                    info!("monitor listener stopping");
                    return;
                }
                accepted = self.tcp.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                if let Err(e) = handle_http(stream, &ctx).await {
                                    debug!(%addr, error = %e, "monitor connection error");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "monitor accept error"),
                    }
                }
            }
        }
    }
}

const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Route a raw connection: `/healthz` as plain HTTP, WebSocket otherwise.
async fn handle_http(mut stream: TcpStream, ctx: &Arc<MonitorCtx>) -> std::io::Result<()> {
    // Peek the request head without consuming it from the handshake's
    // point of view; the buffered bytes replay through `Rewind`.
    let mut head = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") && head.len() < MAX_HEADER_BYTES {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Ok(());
        }
        head.push(byte[0]);
    }

    let head_text = String::from_utf8_lossy(&head);
    let is_upgrade = head_text
        .to_ascii_lowercase()
        .contains("upgrade: websocket");

    if !is_upgrade {
        let response = if head_text.starts_with("GET /healthz") {
            match ctx.runtime.health().await {
                Ok(health) => {
                    let body = json!({
                        "status": if health.read_only { "degraded" } else { "ok" },
                        "uptime_secs": ctx.metrics.uptime_secs(),
                        "workflows_active": health.workflows_active,
                        "workers_active": health.workers_active,
                        "read_only": health.read_only,
                    })
                    .to_string();
                    http_response("200 OK", "application/json", &body)
                }
                Err(_) => http_response("503 Service Unavailable", "text/plain", "unavailable"),
            }
        } else {
            http_response("404 Not Found", "text/plain", "not found")
        };
        stream.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    let rewound = Rewind { prefix: head, offset: 0, inner: stream };
    let ws = match tokio_tungstenite::accept_async(rewound).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(error = %e, "websocket handshake failed");
            return Ok(());
        }
    };
    serve_subscriber(ws, ctx).await;
    Ok(())
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len(),
    )
}

/// One monitor subscriber: answer queries, push lifecycle events.
async fn serve_subscriber(
    mut ws: tokio_tungstenite::WebSocketStream<Rewind<TcpStream>>,
    ctx: &Arc<MonitorCtx>,
) {
    let mut subscription = ctx.bus.subscribe(EventFilter::any());

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }

            item = subscription.recv() => {
                let Some(item) = item else { return };
                let event = match item {
                    BusItem::Event(event) => MonitorEvent::from_lifecycle(&event),
                    BusItem::Gap { missed } => {
                        ctx.metrics.note_dropped_events(missed);
                        MonitorEvent::gap(missed)
                    }
                };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if ws.send(Message::text(text)).await.is_err() {
                    return;
                }
            }

            incoming = ws.next() => {
                let Some(Ok(message)) = incoming else { return };
                let Ok(text) = message.to_text() else { continue };
                if text.is_empty() {
                    continue;
                }
                let response = answer(ctx, text).await;
                let Ok(reply) = serde_json::to_string(&response) else { continue };
                if ws.send(Message::text(reply)).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn answer(ctx: &Arc<MonitorCtx>, text: &str) -> MonitorResponse {
    let request: MonitorRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => return MonitorResponse::Error { message: format!("bad request: {e}") },
    };

    match request {
        MonitorRequest::ListActiveWorkflows => {
            match ctx
                .runtime
                .list_workflows(aether_storage::ListFilter::active())
                .await
            {
                Ok(workflows) => MonitorResponse::WorkflowList {
                    workflows: workflows.iter().map(Into::into).collect(),
                },
                Err(e) => MonitorResponse::Error { message: e.to_string() },
            }
        }
        MonitorRequest::ListAllWorkflows => {
            match ctx
                .runtime
                .list_workflows(aether_storage::ListFilter::all())
                .await
            {
                Ok(workflows) => MonitorResponse::WorkflowList {
                    workflows: workflows.iter().map(Into::into).collect(),
                },
                Err(e) => MonitorResponse::Error { message: e.to_string() },
            }
        }
        MonitorRequest::GetWorkflow { workflow_id } => {
            match ctx.runtime.get_workflow(WorkflowId::from(workflow_id)).await {
                Ok(workflow) => MonitorResponse::WorkflowDetail {
                    detail: Box::new((&workflow).into()),
                },
                Err(e) => MonitorResponse::Error { message: e.to_string() },
            }
        }
        MonitorRequest::GetWorkflowHistory { workflow_id } => {
            match ctx.runtime.get_workflow(WorkflowId::from(workflow_id)).await {
                Ok(workflow) => MonitorResponse::WorkflowHistory {
                    history: workflow.steps.iter().map(Into::into).collect(),
                },
                Err(e) => MonitorResponse::Error { message: e.to_string() },
            }
        }
    }
}

/// AsyncRead/AsyncWrite adapter replaying already-consumed header bytes
/// before the live stream (the WebSocket handshake re-reads the request).
struct Rewind<S> {
    prefix: Vec<u8>,
    offset: usize,
    inner: S,
}

impl<S: AsyncRead + Unpin> AsyncRead for Rewind<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.offset < self.prefix.len() {
            let remaining = &self.prefix[self.offset..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            self.offset += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Rewind<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;

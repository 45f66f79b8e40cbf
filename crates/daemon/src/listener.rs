// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator API listener.
//!
//! Accepts TCP connections and handles them in spawned tasks without
//! blocking the engine loop. Each connection is request/response until an
//! `OpenTaskStream` switches it into push mode.

use std::sync::Arc;
use std::time::Duration;

use aether_core::{CoreError, SessionToken, TaskId, WorkerId, WorkflowId};
use aether_engine::{RuntimeHandle, StreamPush};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::protocol::{
    read_message, write_message, ProtocolError, Request, Response, PROTOCOL_VERSION,
};

/// Shared daemon context for all connection handlers.
pub(crate) struct ListenCtx {
    pub runtime: RuntimeHandle,
    pub shutdown: CancellationToken,
}

pub(crate) struct Listener {
    tcp: TcpListener,
    ctx: Arc<ListenCtx>,
}

impl Listener {
    pub fn new(tcp: TcpListener, ctx: Arc<ListenCtx>) -> Self {
        Self { tcp, ctx }
    }

    /// Accept until shutdown, one spawned task per connection.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => {
                    info!("coordinator listener stopping");
                    return;
                }
                accepted = self.tcp.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                let (reader, writer) = stream.into_split();
                                if let Err(e) = handle_connection(reader, writer, &ctx).await {
                                    log_connection_error(&addr, e);
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "tcp accept error"),
                    }
                }
            }
        }
    }
}

fn log_connection_error(addr: &std::net::SocketAddr, e: ProtocolError) {
    match e {
        ProtocolError::Closed => debug!(%addr, "connection closed"),
        other => debug!(%addr, error = %other, "connection error"),
    }
}

async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &Arc<ListenCtx>,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let request = tokio::select! {
            _ = ctx.shutdown.cancelled() => return Ok(()),
            request = read_message::<_, Request>(&mut reader) => request?,
        };

        // Streaming claim: acknowledge, then push until either side quits.
        if let Request::OpenTaskStream { session_token } = &request {
            let session = SessionToken::from(session_token.as_str());
            match ctx.runtime.open_stream(session).await {
                Ok(stream) => {
                    write_message(&mut writer, &Response::StreamOpened).await?;
                    return pump_stream(writer, stream, ctx).await;
                }
                Err(e) => {
                    write_message(&mut writer, &Response::error(&e)).await?;
                    continue;
                }
            }
        }

        let response = dispatch(ctx, request).await;
        write_message(&mut writer, &response).await?;
    }
}

/// Forward pushed tasks and cancellation notices to the worker.
async fn pump_stream<W>(
    mut writer: W,
    mut stream: tokio::sync::mpsc::Receiver<StreamPush>,
    ctx: &Arc<ListenCtx>,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => return Ok(()),
            push = stream.recv() => {
                let Some(push) = push else {
                    // Runtime dropped the stream (replaced or session dead).
                    return Ok(());
                };
                let frame = match push {
                    StreamPush::Task(task) => Response::Task { task: (&task).into() },
                    StreamPush::Cancel { workflow_id, task_id } => Response::CancelTask {
                        workflow_id: workflow_id.to_string(),
                        task_id: task_id.to_string(),
                    },
                };
                write_message(&mut writer, &frame).await?;
            }
        }
    }
}

async fn dispatch(ctx: &Arc<ListenCtx>, request: Request) -> Response {
    let runtime = &ctx.runtime;
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version } => {
            debug!(client_version = %version, "hello");
            Response::Hello { version: PROTOCOL_VERSION.to_string() }
        }

        Request::StartWorkflow { workflow_type, input } => {
            match runtime.start_workflow(workflow_type, input).await {
                Ok(id) => Response::WorkflowStarted { workflow_id: id.to_string() },
                Err(e) => Response::error(&e),
            }
        }

        Request::GetWorkflowStatus { workflow_id } => {
            match runtime.status(WorkflowId::from(workflow_id)).await {
                Ok(status) => Response::WorkflowStatus { status: (&status).into() },
                Err(e) => Response::error(&e),
            }
        }

        Request::AwaitResult { workflow_id, timeout_ms } => {
            let timeout = Duration::from_millis(timeout_ms);
            match runtime
                .await_result(WorkflowId::from(workflow_id), timeout)
                .await
            {
                Ok(outcome) => Response::AwaitResult { outcome: outcome.into() },
                Err(e) => Response::error(&e),
            }
        }

        Request::CancelWorkflow { workflow_id } => {
            match runtime.cancel(WorkflowId::from(workflow_id)).await {
                Ok(outcome) => Response::CancelResult { outcome: outcome.into() },
                Err(e) => Response::error(&e),
            }
        }

        Request::Register {
            service_name,
            group,
            capabilities,
            workflow_types,
            worker_id,
        } => {
            let worker_id = worker_id.map(WorkerId::from);
            match runtime
                .register(worker_id, service_name, group, capabilities, workflow_types)
                .await
            {
                Ok(registration) => Response::Registered {
                    worker_id: registration.worker_id.to_string(),
                    session_token: registration.session_token.to_string(),
                },
                Err(e) => Response::error(&e),
            }
        }

        Request::PollTasks { session_token, max } => {
            let session = SessionToken::from(session_token);
            match runtime.poll_tasks(session, max as usize).await {
                Ok(tasks) => Response::Tasks {
                    tasks: tasks.iter().map(Into::into).collect(),
                },
                Err(e) => Response::error(&e),
            }
        }

        // Handled before dispatch; reaching here means a protocol misuse.
        Request::OpenTaskStream { .. } => Response::error(&CoreError::ProtocolViolation(
            "OpenTaskStream must be the stream connection's request".into(),
        )),

        Request::CompleteStep { session_token, task_id, completion } => {
            let session = SessionToken::from(session_token);
            let task_id = TaskId::from(task_id);
            match runtime
                .complete_step(session, task_id, completion.into())
                .await
            {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(&e),
            }
        }

        Request::ReportStep {
            session_token,
            workflow_id,
            step_name,
            status,
            payload,
        } => {
            let session = SessionToken::from(session_token);
            match runtime
                .report_step(session, WorkflowId::from(workflow_id), step_name, status, payload)
                .await
            {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(&e),
            }
        }

        Request::ReturnTask { session_token, task_id } => {
            let session = SessionToken::from(session_token);
            match runtime.return_task(session, TaskId::from(task_id)).await {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(&e),
            }
        }

        Request::Heartbeat { session_token, task_id } => {
            let result = match (session_token, task_id) {
                (Some(session), None) => {
                    runtime
                        .heartbeat_session(SessionToken::from(session))
                        .await
                }
                (None, Some(task)) => runtime.heartbeat_task(TaskId::from(task)).await,
                _ => Err(CoreError::ProtocolViolation(
                    "heartbeat requires exactly one of session_token or task_id".into(),
                )),
            };
            match result {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(&e),
            }
        }

        Request::Drain { session_token } => {
            match runtime.drain(SessionToken::from(session_token)).await {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(&e),
            }
        }

        Request::ListWorkflows { filter } => match runtime.list_workflows(filter).await {
            Ok(workflows) => Response::Workflows {
                workflows: workflows.iter().map(Into::into).collect(),
            },
            Err(e) => Response::error(&e),
        },

        Request::GetWorkflowDetail { workflow_id } => {
            match runtime.get_workflow(WorkflowId::from(workflow_id)).await {
                Ok(workflow) => Response::WorkflowDetail {
                    detail: Box::new((&workflow).into()),
                },
                Err(e) => Response::error(&e),
            }
        }

        Request::ListWorkers => match runtime.list_workers().await {
            Ok(workers) => Response::Workers {
                workers: workers.iter().map(Into::into).collect(),
            },
            Err(e) => Response::error(&e),
        },
    }
}

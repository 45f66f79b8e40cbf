// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the end-to-end specs.

use std::path::Path;
use std::time::Duration;

use aether_core::{
    BackoffStrategy, Capability, Config, Payload, PersistenceMode, ReportPhase, RetryConfig,
};
use aether_daemon::protocol::{read_message, write_message};
use aether_daemon::{CompletionDto, Request, Response, Server, TaskDto, WorkflowDetail};
use aether_storage::ListFilter;
use tokio::net::TcpStream;

/// Spec-friendly timeouts: fast sweeps, short liveness windows.
pub fn spec_config(mode: PersistenceMode, db: &Path) -> Config {
    let mut config = Config::default();
    config.server.grpc_port = 0;
    config.server.http_port = 0;
    config.server.db_path = db.to_path_buf();
    config.persistence.mode = mode;
    config.timeouts.heartbeat_ms = 500;
    config.timeouts.visibility_ms = 5_000;
    config.timeouts.cancel_deadline_ms = 1_000;
    config.timeouts.sweep_interval_ms = 50;
    config.timeouts.snapshot_interval_ms = 100;
    config.retry = RetryConfig {
        max_retries: 3,
        strategy: BackoffStrategy::None,
        base_delay_ms: 0,
        max_delay_ms: 0,
    };
    config
}

pub async fn start_server(mode: PersistenceMode, db: &Path) -> Server {
    Server::start(spec_config(mode, db)).await.expect("server start")
}

pub async fn start_server_with(config: Config) -> Server {
    Server::start(config).await.expect("server start")
}

/// One framed request/response connection.
pub struct Conn {
    stream: TcpStream,
}

impl Conn {
    pub async fn open(server: &Server) -> Self {
        let addr = format!("127.0.0.1:{}", server.grpc_addr.port());
        let stream = TcpStream::connect(&addr).await.expect("connect");
        Self { stream }
    }

    pub async fn request(&mut self, request: &Request) -> Response {
        write_message(&mut self.stream, request).await.expect("write");
        read_message(&mut self.stream).await.expect("read")
    }

    /// Next frame on a push-mode (task stream) connection.
    pub async fn next_frame(&mut self, timeout: Duration) -> Option<Response> {
        tokio::time::timeout(timeout, read_message(&mut self.stream))
            .await
            .ok()
            .and_then(Result::ok)
    }

    pub async fn start(&mut self, workflow_type: &str, input: &str) -> String {
        match self
            .request(&Request::StartWorkflow {
                workflow_type: workflow_type.into(),
                input: Payload::from(input),
            })
            .await
        {
            Response::WorkflowStarted { workflow_id } => workflow_id,
            other => panic!("start failed: {other:?}"),
        }
    }

    pub async fn register(
        &mut self,
        capabilities: Vec<Capability>,
        workflow_types: &[&str],
    ) -> String {
        match self
            .request(&Request::Register {
                service_name: "spec-worker".into(),
                group: "default".into(),
                capabilities,
                workflow_types: workflow_types.iter().map(|t| t.to_string()).collect(),
                worker_id: None,
            })
            .await
        {
            Response::Registered { session_token, .. } => session_token,
            other => panic!("register failed: {other:?}"),
        }
    }

    pub async fn poll(&mut self, session: &str, max: u32) -> Vec<TaskDto> {
        match self
            .request(&Request::PollTasks { session_token: session.into(), max })
            .await
        {
            Response::Tasks { tasks } => tasks,
            other => panic!("poll failed: {other:?}"),
        }
    }

    /// Poll until a task shows up or the deadline passes.
    pub async fn poll_until(&mut self, session: &str, timeout: Duration) -> TaskDto {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut tasks = self.poll(session, 1).await;
            if let Some(task) = tasks.pop() {
                return task;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no task arrived within {timeout:?}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn complete_ok(&mut self, session: &str, task_id: &str, result: &str) {
        let response = self
            .request(&Request::CompleteStep {
                session_token: session.into(),
                task_id: task_id.into(),
                completion: CompletionDto::Completed { result: Payload::from(result) },
            })
            .await;
        assert_eq!(response, Response::Ok, "complete_ok failed");
    }

    pub async fn complete_err(&mut self, session: &str, task_id: &str, error: &str) {
        let response = self
            .request(&Request::CompleteStep {
                session_token: session.into(),
                task_id: task_id.into(),
                completion: CompletionDto::Failed { error: error.into() },
            })
            .await;
        assert_eq!(response, Response::Ok, "complete_err failed");
    }

    pub async fn complete_cancelled(&mut self, session: &str, task_id: &str) {
        let response = self
            .request(&Request::CompleteStep {
                session_token: session.into(),
                task_id: task_id.into(),
                completion: CompletionDto::Cancelled,
            })
            .await;
        assert_eq!(response, Response::Ok, "complete_cancelled failed");
    }

    pub async fn report(
        &mut self,
        session: &str,
        workflow_id: &str,
        step: &str,
        status: ReportPhase,
        payload: &str,
    ) {
        let response = self
            .request(&Request::ReportStep {
                session_token: session.into(),
                workflow_id: workflow_id.into(),
                step_name: step.into(),
                status,
                payload: Payload::from(payload),
            })
            .await;
        assert_eq!(response, Response::Ok, "report failed");
    }

    pub async fn await_result(&mut self, workflow_id: &str, timeout_ms: u64) -> Response {
        self.request(&Request::AwaitResult { workflow_id: workflow_id.into(), timeout_ms })
            .await
    }

    pub async fn detail(&mut self, workflow_id: &str) -> WorkflowDetail {
        match self
            .request(&Request::GetWorkflowDetail { workflow_id: workflow_id.into() })
            .await
        {
            Response::WorkflowDetail { detail } => *detail,
            other => panic!("detail failed: {other:?}"),
        }
    }

    pub async fn list_all(&mut self) -> Vec<aether_daemon::WorkflowSummary> {
        match self
            .request(&Request::ListWorkflows { filter: ListFilter::all() })
            .await
        {
            Response::Workflows { workflows } => workflows,
            other => panic!("list failed: {other:?}"),
        }
    }

    /// Switch this connection into push mode.
    pub async fn open_task_stream(&mut self, session: &str) {
        let response = self
            .request(&Request::OpenTaskStream { session_token: session.into() })
            .await;
        assert_eq!(response, Response::StreamOpened, "open_task_stream failed");
    }
}

/// Poll a condition with a bounded wait.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

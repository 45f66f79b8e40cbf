// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator runtime.
//!
//! One loop owns the store, registry, queue, and bus; every request enters
//! as a message and is answered over a oneshot. The loop is the
//! serialization unit: per-workflow transition atomicity (validate →
//! persist → emit → enqueue → ack) follows from processing one message at
//! a time, and handlers never await while holding state.

mod client;
mod recovery;
mod sweep;
mod worker;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aether_core::{
    Capability, Clock, Config, CoreError, LifecycleEvent, Payload, ReportPhase, RetryPolicy,
    SessionToken, Task, TaskId, WorkerId, WorkerInfo, Workflow, WorkflowAction, WorkflowId,
    WorkflowState,
};
use aether_storage::{ListFilter, StoreError, WorkflowStore};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::bus::EventBus;
use crate::queue::TaskQueue;
use crate::registry::{Registration, WorkerRegistry};

/// Engine tuning knobs, usually derived from the server [`Config`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub heartbeat_ms: u64,
    pub visibility_ms: u64,
    pub cancel_deadline_ms: u64,
    pub retention_ms: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RuntimeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_ms: config.timeouts.heartbeat_ms,
            visibility_ms: config.timeouts.visibility_ms,
            cancel_deadline_ms: config.timeouts.cancel_deadline_ms,
            retention_ms: config.retention.keep_terminal_secs.map(|s| s * 1_000),
            retry: config.retry.policy(),
        }
    }
}

/// Monotonic counters shared with the metrics endpoint.
#[derive(Default)]
pub struct Counters {
    pub workflows_started: AtomicU64,
    pub workflows_completed: AtomicU64,
    pub workflows_failed: AtomicU64,
    pub workflows_cancelled: AtomicU64,
    pub tasks_dispatched: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_redelivered: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub workflows_started: u64,
    pub workflows_completed: u64,
    pub workflows_failed: u64,
    pub workflows_cancelled: u64,
    pub tasks_dispatched: u64,
    pub tasks_completed: u64,
    pub tasks_redelivered: u64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            workflows_started: self.workflows_started.load(Ordering::Relaxed),
            workflows_completed: self.workflows_completed.load(Ordering::Relaxed),
            workflows_failed: self.workflows_failed.load(Ordering::Relaxed),
            workflows_cancelled: self.workflows_cancelled.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_redelivered: self.tasks_redelivered.load(Ordering::Relaxed),
        }
    }
}

/// Result a worker hands back for a claimed task.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(Payload),
    Failed(String),
    Cancelled,
}

/// Frames pushed to a worker's task-stream connection.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPush {
    Task(Task),
    /// Cancellation notice for a claimed task.
    Cancel { workflow_id: WorkflowId, task_id: TaskId },
}

/// `get-workflow-status` projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub workflow_id: WorkflowId,
    pub state: WorkflowState,
    pub current_step: Option<String>,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

impl From<&Workflow> for StatusView {
    fn from(wf: &Workflow) -> Self {
        Self {
            workflow_id: wf.id,
            state: wf.state,
            current_step: wf.current_step.clone(),
            started_at_ms: wf.created_at_ms,
            completed_at_ms: wf.completed_at_ms,
        }
    }
}

/// `await-result` answer. Still-running is a recoverable signal, not an
/// error: the caller may poll or re-await.
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome {
    Completed(Payload),
    Failed(String),
    Cancelled,
    StillRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Accepted,
    AlreadyTerminal,
}

/// Health projection for the http endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthView {
    pub read_only: bool,
    pub workflows_active: usize,
    pub workers_active: usize,
}

/// Either an immediate answer or a parked waiter.
enum AwaitWait {
    Ready(AwaitOutcome),
    Pending(oneshot::Receiver<AwaitOutcome>),
}

enum Msg {
    Start {
        workflow_type: String,
        input: Payload,
        reply: oneshot::Sender<Result<WorkflowId, CoreError>>,
    },
    Status {
        workflow_id: WorkflowId,
        reply: oneshot::Sender<Result<StatusView, CoreError>>,
    },
    Await {
        workflow_id: WorkflowId,
        reply: oneshot::Sender<Result<AwaitWait, CoreError>>,
    },
    Cancel {
        workflow_id: WorkflowId,
        reply: oneshot::Sender<Result<CancelOutcome, CoreError>>,
    },
    Register {
        worker_id: Option<WorkerId>,
        service_name: String,
        group: String,
        capabilities: Vec<Capability>,
        workflow_types: Vec<String>,
        reply: oneshot::Sender<Result<Registration, CoreError>>,
    },
    HeartbeatSession {
        session: SessionToken,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    HeartbeatTask {
        task_id: TaskId,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Drain {
        session: SessionToken,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Poll {
        session: SessionToken,
        max: usize,
        reply: oneshot::Sender<Result<Vec<Task>, CoreError>>,
    },
    OpenStream {
        session: SessionToken,
        reply: oneshot::Sender<Result<mpsc::Receiver<StreamPush>, CoreError>>,
    },
    Complete {
        session: SessionToken,
        task_id: TaskId,
        outcome: StepOutcome,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    Report {
        session: SessionToken,
        workflow_id: WorkflowId,
        step: String,
        phase: ReportPhase,
        payload: Payload,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    ReturnTask {
        session: SessionToken,
        task_id: TaskId,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    ListWorkflows {
        filter: ListFilter,
        reply: oneshot::Sender<Result<Vec<Workflow>, CoreError>>,
    },
    GetWorkflow {
        workflow_id: WorkflowId,
        reply: oneshot::Sender<Result<Workflow, CoreError>>,
    },
    ListWorkers {
        reply: oneshot::Sender<Vec<WorkerInfo>>,
    },
    Health {
        reply: oneshot::Sender<HealthView>,
    },
    Tick,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// The coordinator. One instance per server; owns all mutable state.
pub struct Runtime<C: Clock> {
    store: Box<dyn WorkflowStore>,
    registry: WorkerRegistry,
    queue: TaskQueue,
    bus: EventBus,
    clock: C,
    cfg: RuntimeConfig,
    counters: Arc<Counters>,
    waiters: HashMap<WorkflowId, Vec<oneshot::Sender<AwaitOutcome>>>,
    streams: HashMap<SessionToken, mpsc::Sender<StreamPush>>,
    /// Recovered workflows whose next step cannot be derived until a
    /// worker registers for their type.
    parked: HashSet<WorkflowId>,
    cancel_deadlines: HashMap<WorkflowId, u64>,
    read_only: bool,
    rx: mpsc::Receiver<Msg>,
}

/// Cloneable handle used by listeners, sweeps, and tests.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Msg>,
    counters: Arc<Counters>,
}

const STREAM_BUFFER: usize = 32;

impl<C: Clock> Runtime<C> {
    /// Recover state, then run the loop on a spawned task.
    pub fn spawn(
        store: Box<dyn WorkflowStore>,
        bus: EventBus,
        clock: C,
        cfg: RuntimeConfig,
    ) -> RuntimeHandle {
        let (tx, rx) = mpsc::channel(256);
        let counters = Arc::new(Counters::default());
        let mut runtime = Runtime {
            store,
            registry: WorkerRegistry::new(),
            queue: TaskQueue::new(),
            bus,
            clock,
            cfg,
            counters: Arc::clone(&counters),
            waiters: HashMap::new(),
            streams: HashMap::new(),
            parked: HashSet::new(),
            cancel_deadlines: HashMap::new(),
            read_only: false,
            rx,
        };
        runtime.recover();
        tokio::spawn(async move { runtime.run().await });
        RuntimeHandle { tx, counters }
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            if self.handle_msg(msg) {
                break;
            }
        }
        tracing::info!("runtime loop stopped");
    }

    /// Returns true when the loop should stop.
    fn handle_msg(&mut self, msg: Msg) -> bool {
        match msg {
            Msg::Start { workflow_type, input, reply } => {
                let _ = reply.send(self.handle_start(workflow_type, input));
            }
            Msg::Status { workflow_id, reply } => {
                let _ = reply.send(self.handle_status(&workflow_id));
            }
            Msg::Await { workflow_id, reply } => {
                let _ = reply.send(self.handle_await(&workflow_id));
            }
            Msg::Cancel { workflow_id, reply } => {
                let _ = reply.send(self.handle_cancel(&workflow_id));
            }
            Msg::Register {
                worker_id,
                service_name,
                group,
                capabilities,
                workflow_types,
                reply,
            } => {
                let _ = reply.send(self.handle_register(
                    worker_id,
                    service_name,
                    group,
                    capabilities,
                    workflow_types,
                ));
            }
            Msg::HeartbeatSession { session, reply } => {
                let now = self.clock.epoch_ms();
                let _ = reply.send(self.registry.heartbeat(&session, now));
            }
            Msg::HeartbeatTask { task_id, reply } => {
                let now = self.clock.epoch_ms();
                let ok = self
                    .queue
                    .heartbeat_task(&task_id, now, self.cfg.visibility_ms);
                let _ = reply.send(if ok {
                    Ok(())
                } else {
                    Err(CoreError::NotFound(format!("task {task_id}")))
                });
            }
            Msg::Drain { session, reply } => {
                let _ = reply.send(self.registry.drain(&session));
            }
            Msg::Poll { session, max, reply } => {
                let _ = reply.send(self.handle_poll(&session, max));
            }
            Msg::OpenStream { session, reply } => {
                let _ = reply.send(self.handle_open_stream(&session));
            }
            Msg::Complete { session, task_id, outcome, reply } => {
                let _ = reply.send(self.handle_complete(&session, &task_id, outcome));
            }
            Msg::Report { session, workflow_id, step, phase, payload, reply } => {
                let _ = reply.send(self.handle_report(&session, &workflow_id, step, phase, payload));
            }
            Msg::ReturnTask { session, task_id, reply } => {
                let _ = reply.send(self.handle_return(&session, &task_id));
            }
            Msg::ListWorkflows { filter, reply } => {
                let _ = reply.send(self.store.list(&filter).map_err(Into::into));
            }
            Msg::GetWorkflow { workflow_id, reply } => {
                let _ = reply.send(self.store.get(&workflow_id).map_err(Into::into));
            }
            Msg::ListWorkers { reply } => {
                let _ = reply.send(self.registry.workers().cloned().collect());
            }
            Msg::Health { reply } => {
                let _ = reply.send(self.handle_health());
            }
            Msg::Tick => self.handle_tick(),
            Msg::Shutdown { reply } => {
                if let Err(e) = self.store.flush() {
                    tracing::error!(error = %e, "flush on shutdown failed");
                }
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    fn handle_health(&self) -> HealthView {
        let workflows_active = self
            .store
            .list(&ListFilter::active())
            .map(|w| w.len())
            .unwrap_or(0);
        HealthView {
            read_only: self.read_only,
            workflows_active,
            workers_active: self.registry.active_count(),
        }
    }

    /// Persist an action, degrading to read-only on I/O failure.
    fn persist(
        &mut self,
        workflow_id: &WorkflowId,
        action: WorkflowAction,
    ) -> Result<Workflow, CoreError> {
        match self.store.update(workflow_id, action) {
            Ok(wf) => Ok(wf),
            Err(e @ (StoreError::NotFound(_) | StoreError::Duplicate(_))) => Err(e.into()),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    workflow_id = %workflow_id,
                    "persistence failure, degrading to read-only"
                );
                self.read_only = true;
                Err(CoreError::PersistenceFailure(e.to_string()))
            }
        }
    }

    fn reject_if_read_only(&self) -> Result<(), CoreError> {
        if self.read_only {
            return Err(CoreError::PersistenceFailure(
                "coordinator is read-only after a persistence failure".into(),
            ));
        }
        Ok(())
    }

    fn emit(&self, event: LifecycleEvent) {
        self.bus.publish(event);
    }

    /// Terminal outcome projection for await-result.
    fn outcome_of(workflow: &Workflow) -> AwaitOutcome {
        match workflow.state {
            WorkflowState::Completed => {
                AwaitOutcome::Completed(workflow.result.clone().unwrap_or_default())
            }
            WorkflowState::Failed => {
                AwaitOutcome::Failed(workflow.error.clone().unwrap_or_default())
            }
            WorkflowState::Cancelled => AwaitOutcome::Cancelled,
            WorkflowState::Pending | WorkflowState::Running => AwaitOutcome::StillRunning,
        }
    }

    fn notify_waiters(&mut self, workflow: &Workflow) {
        if let Some(waiters) = self.waiters.remove(&workflow.id) {
            let outcome = Self::outcome_of(workflow);
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }
}

impl RuntimeHandle {
    async fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Msg,
    ) -> Result<T, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(build(tx))
            .await
            .map_err(|_| CoreError::Internal("runtime stopped".into()))?;
        rx.await
            .map_err(|_| CoreError::Internal("runtime dropped the request".into()))
    }

    pub async fn start_workflow(
        &self,
        workflow_type: impl Into<String>,
        input: Payload,
    ) -> Result<WorkflowId, CoreError> {
        let workflow_type = workflow_type.into();
        self.send(|reply| Msg::Start { workflow_type, input, reply })
            .await?
    }

    pub async fn status(&self, workflow_id: WorkflowId) -> Result<StatusView, CoreError> {
        self.send(|reply| Msg::Status { workflow_id, reply }).await?
    }

    /// Block up to `timeout` for a terminal state. Timeout zero answers
    /// immediately; an expired wait yields `StillRunning`, never an error.
    pub async fn await_result(
        &self,
        workflow_id: WorkflowId,
        timeout: Duration,
    ) -> Result<AwaitOutcome, CoreError> {
        let wait = self.send(|reply| Msg::Await { workflow_id, reply }).await??;
        match wait {
            AwaitWait::Ready(outcome) => Ok(outcome),
            AwaitWait::Pending(_) if timeout.is_zero() => Ok(AwaitOutcome::StillRunning),
            AwaitWait::Pending(rx) => match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(outcome)) => Ok(outcome),
                // Runtime dropped the waiter (shutdown).
                Ok(Err(_)) => Err(CoreError::Internal("runtime stopped".into())),
                Err(_) => Ok(AwaitOutcome::StillRunning),
            },
        }
    }

    pub async fn cancel(&self, workflow_id: WorkflowId) -> Result<CancelOutcome, CoreError> {
        self.send(|reply| Msg::Cancel { workflow_id, reply }).await?
    }

    pub async fn register(
        &self,
        worker_id: Option<WorkerId>,
        service_name: impl Into<String>,
        group: impl Into<String>,
        capabilities: Vec<Capability>,
        workflow_types: Vec<String>,
    ) -> Result<Registration, CoreError> {
        let service_name = service_name.into();
        let group = group.into();
        self.send(|reply| Msg::Register {
            worker_id,
            service_name,
            group,
            capabilities,
            workflow_types,
            reply,
        })
        .await?
    }

    pub async fn heartbeat_session(&self, session: SessionToken) -> Result<(), CoreError> {
        self.send(|reply| Msg::HeartbeatSession { session, reply })
            .await?
    }

    pub async fn heartbeat_task(&self, task_id: TaskId) -> Result<(), CoreError> {
        self.send(|reply| Msg::HeartbeatTask { task_id, reply })
            .await?
    }

    pub async fn drain(&self, session: SessionToken) -> Result<(), CoreError> {
        self.send(|reply| Msg::Drain { session, reply }).await?
    }

    pub async fn poll_tasks(
        &self,
        session: SessionToken,
        max: usize,
    ) -> Result<Vec<Task>, CoreError> {
        self.send(|reply| Msg::Poll { session, max, reply }).await?
    }

    pub async fn open_stream(
        &self,
        session: SessionToken,
    ) -> Result<mpsc::Receiver<StreamPush>, CoreError> {
        self.send(|reply| Msg::OpenStream { session, reply }).await?
    }

    pub async fn complete_step(
        &self,
        session: SessionToken,
        task_id: TaskId,
        outcome: StepOutcome,
    ) -> Result<(), CoreError> {
        self.send(|reply| Msg::Complete { session, task_id, outcome, reply })
            .await?
    }

    pub async fn report_step(
        &self,
        session: SessionToken,
        workflow_id: WorkflowId,
        step: impl Into<String>,
        phase: ReportPhase,
        payload: Payload,
    ) -> Result<(), CoreError> {
        let step = step.into();
        self.send(|reply| Msg::Report { session, workflow_id, step, phase, payload, reply })
            .await?
    }

    pub async fn return_task(
        &self,
        session: SessionToken,
        task_id: TaskId,
    ) -> Result<(), CoreError> {
        self.send(|reply| Msg::ReturnTask { session, task_id, reply })
            .await?
    }

    pub async fn list_workflows(&self, filter: ListFilter) -> Result<Vec<Workflow>, CoreError> {
        self.send(|reply| Msg::ListWorkflows { filter, reply })
            .await?
    }

    pub async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Workflow, CoreError> {
        self.send(|reply| Msg::GetWorkflow { workflow_id, reply })
            .await?
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerInfo>, CoreError> {
        self.send(|reply| Msg::ListWorkers { reply }).await
    }

    pub async fn health(&self) -> Result<HealthView, CoreError> {
        self.send(|reply| Msg::Health { reply }).await
    }

    /// Run one sweep pass (heartbeats, visibility, deadlines, retention).
    pub async fn tick(&self) {
        let _ = self.tx.send(Msg::Tick).await;
    }

    /// Flush the store and stop the loop.
    pub async fn shutdown(&self) {
        let _ = self.send(|reply| Msg::Shutdown { reply }).await;
    }

    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }
}

#[cfg(test)]
#[path = "../runtime_tests/mod.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry: live sessions, advertised capabilities, liveness.
//!
//! Owned by the runtime loop; never locked. A session token minted at
//! registration gates every subsequent worker operation, so a worker
//! whose session was expired cannot act on a stale claim.

use std::collections::{HashMap, HashSet};

use aether_core::{
    Capability, CapabilityKind, CoreError, SessionState, SessionToken, WorkerId, WorkerInfo,
};

/// Dead records linger this many heartbeat-timeouts for id revival, then
/// are dropped entirely.
const DEAD_RETENTION_FACTOR: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub worker_id: WorkerId,
    pub session_token: SessionToken,
}

#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerId, WorkerInfo>,
    by_session: HashMap<SessionToken, WorkerId>,
    /// Declared step programs per workflow type (first registration wins).
    programs: HashMap<String, Vec<String>>,
    /// Types whose workflow body runs inside a worker.
    driven: HashSet<String>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker. A client-supplied id that is still Active or
    /// Draining is a duplicate; a Dead one is revived with a new session.
    pub fn register(
        &mut self,
        worker_id: Option<WorkerId>,
        service_name: String,
        group: String,
        capabilities: Vec<Capability>,
        workflow_types: Vec<String>,
        now_ms: u64,
    ) -> Result<Registration, CoreError> {
        let worker_id = worker_id.unwrap_or_else(WorkerId::new);

        if let Some(existing) = self.workers.get(&worker_id) {
            if existing.state != SessionState::Dead {
                return Err(CoreError::Duplicate(format!(
                    "worker {worker_id} is already registered"
                )));
            }
            self.by_session.remove(&existing.session);
        }

        let session = SessionToken::new();
        let info = WorkerInfo {
            worker_id,
            service_name,
            group,
            capabilities,
            workflow_types,
            session,
            state: SessionState::Active,
            last_heartbeat_ms: now_ms,
        };

        self.learn_dispatch_metadata(&info);
        self.by_session.insert(session, worker_id);
        self.workers.insert(worker_id, info);

        Ok(Registration { worker_id, session_token: session })
    }

    /// Record a type's dispatch mode from advertised capabilities. The
    /// first registration for a type wins; later conflicts are ignored.
    fn learn_dispatch_metadata(&mut self, info: &WorkerInfo) {
        if info.drives_body() {
            for t in &info.workflow_types {
                self.driven.insert(t.clone());
            }
        }
        let steps = info.step_program();
        if steps.is_empty() {
            return;
        }
        for t in &info.workflow_types {
            match self.programs.get(t) {
                Some(existing) if *existing != steps => {
                    tracing::warn!(
                        workflow_type = %t,
                        worker_id = %info.worker_id,
                        "conflicting step program ignored (first registration wins)"
                    );
                }
                Some(_) => {}
                None => {
                    self.programs.insert(t.clone(), steps.clone());
                }
            }
        }
    }

    /// Refresh a session's liveness.
    pub fn heartbeat(&mut self, session: &SessionToken, now_ms: u64) -> Result<(), CoreError> {
        let info = self.resolve_mut(session)?;
        info.last_heartbeat_ms = now_ms;
        Ok(())
    }

    /// No new tasks for this worker; in-flight tasks may still complete.
    pub fn drain(&mut self, session: &SessionToken) -> Result<(), CoreError> {
        let info = self.resolve_mut(session)?;
        info.state = SessionState::Draining;
        Ok(())
    }

    /// Resolve a session token to its live worker record.
    pub fn resolve(&self, session: &SessionToken) -> Result<&WorkerInfo, CoreError> {
        let worker_id = self
            .by_session
            .get(session)
            .ok_or_else(|| CoreError::NotFound(format!("session {session}")))?;
        let info = self
            .workers
            .get(worker_id)
            .ok_or_else(|| CoreError::NotFound(format!("session {session}")))?;
        if info.state == SessionState::Dead {
            return Err(CoreError::ProtocolViolation(format!(
                "session {session} is stale (worker marked dead)"
            )));
        }
        Ok(info)
    }

    fn resolve_mut(&mut self, session: &SessionToken) -> Result<&mut WorkerInfo, CoreError> {
        let worker_id = *self
            .by_session
            .get(session)
            .ok_or_else(|| CoreError::NotFound(format!("session {session}")))?;
        let info = self
            .workers
            .get_mut(&worker_id)
            .ok_or_else(|| CoreError::NotFound(format!("session {session}")))?;
        if info.state == SessionState::Dead {
            return Err(CoreError::ProtocolViolation(format!(
                "session {session} is stale (worker marked dead)"
            )));
        }
        Ok(info)
    }

    /// Active sessions advertising the given workflow type.
    pub fn lookup_for(&self, workflow_type: &str) -> Vec<SessionToken> {
        self.workers
            .values()
            .filter(|w| w.state == SessionState::Active && w.advertises(workflow_type))
            .map(|w| w.session)
            .collect()
    }

    /// Mark sessions without a recent heartbeat Dead and return them so
    /// the caller can release their claims. Long-dead records are pruned.
    pub fn expire(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<(WorkerId, SessionToken)> {
        let mut newly_dead = Vec::new();
        let mut to_prune = Vec::new();

        for info in self.workers.values_mut() {
            let stale_ms = now_ms.saturating_sub(info.last_heartbeat_ms);
            match info.state {
                SessionState::Active | SessionState::Draining if stale_ms > timeout_ms => {
                    info.state = SessionState::Dead;
                    newly_dead.push((info.worker_id, info.session));
                }
                SessionState::Dead if stale_ms > timeout_ms * DEAD_RETENTION_FACTOR => {
                    to_prune.push(info.worker_id);
                }
                _ => {}
            }
        }

        for worker_id in to_prune {
            if let Some(info) = self.workers.remove(&worker_id) {
                self.by_session.remove(&info.session);
            }
        }

        newly_dead
    }

    /// Declared step program for a type, if any worker has advertised one.
    pub fn program(&self, workflow_type: &str) -> Option<&[String]> {
        self.programs.get(workflow_type).map(Vec::as_slice)
    }

    /// True when the type's workflow body runs inside a worker.
    pub fn is_driven(&self, workflow_type: &str) -> bool {
        self.driven.contains(workflow_type)
    }

    pub fn get(&self, worker_id: &WorkerId) -> Option<&WorkerInfo> {
        self.workers.get(worker_id)
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerInfo> {
        self.workers.values()
    }

    pub fn active_count(&self) -> usize {
        self.workers
            .values()
            .filter(|w| w.state == SessionState::Active)
            .count()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

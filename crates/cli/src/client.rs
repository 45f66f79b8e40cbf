// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed TCP client for the coordinator API.

use aether_core::ErrorKind;
use aether_daemon::protocol::{
    read_message, write_message, ProtocolError, Request, Response, PROTOCOL_VERSION,
};
use aether_daemon::{CancelOutcomeDto, WorkflowStatusDto, WorkflowSummary};
use aether_storage::ListFilter;
use thiserror::Error;
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("{kind}: {message}")]
    Server { kind: ErrorKind, message: String },

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Connect and perform the version handshake.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect { addr: addr.to_string(), source })?;
        let mut client = Self { stream };
        let server_version = client.hello().await?;
        if major(&server_version) != major(PROTOCOL_VERSION) {
            return Err(ClientError::Unexpected(format!(
                "server speaks protocol {server_version}, this client speaks {PROTOCOL_VERSION}"
            )));
        }
        Ok(client)
    }

    async fn hello(&mut self) -> Result<String, ClientError> {
        match self
            .request(&Request::Hello { version: PROTOCOL_VERSION.to_string() })
            .await?
        {
            Response::Hello { version } => Ok(version),
            other => Err(Self::unexpected(&other)),
        }
    }

    /// One request/response exchange; server errors become `ClientError`.
    pub async fn request(&mut self, request: &Request) -> Result<Response, ClientError> {
        write_message(&mut self.stream, request).await?;
        match read_message::<_, Response>(&mut self.stream).await? {
            Response::Error { kind, message } => Err(ClientError::Server { kind, message }),
            response => Ok(response),
        }
    }

    pub async fn status(&mut self, workflow_id: &str) -> Result<WorkflowStatusDto, ClientError> {
        let request = Request::GetWorkflowStatus { workflow_id: workflow_id.to_string() };
        match self.request(&request).await? {
            Response::WorkflowStatus { status } => Ok(status),
            other => Err(Self::unexpected(&other)),
        }
    }

    pub async fn cancel(&mut self, workflow_id: &str) -> Result<CancelOutcomeDto, ClientError> {
        let request = Request::CancelWorkflow { workflow_id: workflow_id.to_string() };
        match self.request(&request).await? {
            Response::CancelResult { outcome } => Ok(outcome),
            other => Err(Self::unexpected(&other)),
        }
    }

    pub async fn list_workflows(
        &mut self,
        filter: ListFilter,
    ) -> Result<Vec<WorkflowSummary>, ClientError> {
        match self.request(&Request::ListWorkflows { filter }).await? {
            Response::Workflows { workflows } => Ok(workflows),
            other => Err(Self::unexpected(&other)),
        }
    }

    fn unexpected(response: &Response) -> ClientError {
        ClientError::Unexpected(format!("{response:?}"))
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

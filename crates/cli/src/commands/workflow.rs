// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `aether workflow list`

use aether_core::WorkflowState;
use aether_storage::ListFilter;
use anyhow::Context;

use crate::client::Client;
use crate::output;

pub async fn list(
    addr: &str,
    workflow_type: Option<String>,
    state: Option<String>,
) -> anyhow::Result<()> {
    let state = state
        .map(|s| s.parse::<WorkflowState>())
        .transpose()
        .map_err(anyhow::Error::msg)
        .context("invalid --state")?;
    let filter = ListFilter {
        active_only: false,
        workflow_type,
        state,
        since_ms: None,
    };

    let mut client = Client::connect(addr).await?;
    let workflows = client.list_workflows(filter).await?;

    if workflows.is_empty() {
        println!("no workflows");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = workflows
        .iter()
        .map(|w| {
            vec![
                w.workflow_id.clone(),
                w.workflow_type.clone(),
                w.state.to_string(),
                w.current_step.clone().unwrap_or_else(|| "-".into()),
                w.steps.to_string(),
                output::format_epoch_ms(w.started_at_ms),
            ]
        })
        .collect();
    print!(
        "{}",
        output::table(&["ID", "TYPE", "STATE", "STEP", "ATTEMPTS", "STARTED"], &rows)
    );
    Ok(())
}

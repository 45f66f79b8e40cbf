// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `aether status <workflow-id>`

use crate::client::Client;
use crate::output;

pub async fn run(addr: &str, workflow_id: &str) -> anyhow::Result<()> {
    let mut client = Client::connect(addr).await?;
    let status = client.status(workflow_id).await?;

    println!("workflow:  {}", status.workflow_id);
    println!("state:     {}", status.state);
    println!(
        "step:      {}",
        status.current_step.as_deref().unwrap_or("-")
    );
    println!("started:   {}", output::format_epoch_ms(status.started_at_ms));
    match status.completed_at_ms {
        Some(at) => println!("completed: {}", output::format_epoch_ms(at)),
        None => println!("completed: -"),
    }
    Ok(())
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `aether cancel <workflow-id>`

use aether_daemon::CancelOutcomeDto;

use crate::client::Client;

pub async fn run(addr: &str, workflow_id: &str) -> anyhow::Result<()> {
    let mut client = Client::connect(addr).await?;
    match client.cancel(workflow_id).await? {
        CancelOutcomeDto::Accepted => println!("cancellation accepted for {workflow_id}"),
        CancelOutcomeDto::AlreadyTerminal => {
            println!("{workflow_id} is already terminal; nothing to cancel")
        }
    }
    Ok(())
}

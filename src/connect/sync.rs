use std::time::Duration;

use anyhow::{Context as _, Result};
use console::style;

use crate::api::{models::SyncData, ConnectApi, RepoRef};
use crate::poll::{poll_until, PollStatus};
use crate::terminal::table::{add_row, make_table, print_table};

/// Items of a sync batch split by their terminal state
#[derive(Debug)]
pub struct SyncBatchProgress {
    pub total: usize,
    pub good: Vec<SyncData>,
    pub bad: Vec<SyncData>,
}

impl SyncBatchProgress {
    pub fn new(syncs: Vec<SyncData>) -> Self {
        let total = syncs.len();
        let (good, rest): (Vec<_>, Vec<_>) = syncs
            .into_iter()
            .partition(|sync| sync.state.is_good_terminal());
        let bad = rest
            .into_iter()
            .filter(|sync| sync.state.is_bad_terminal())
            .collect();
        Self { total, good, bad }
    }

    pub fn finished(&self) -> usize {
        self.good.len() + self.bad.len()
    }

    /// The batch itself has no state, it's done once every item we know of is.
    /// Items appearing between two polls are not accounted for.
    pub fn is_done(&self) -> bool {
        self.finished() >= self.total
    }
}

pub async fn run_sync(
    api: &impl ConnectApi,
    repo: &RepoRef,
    poll_interval: Duration,
) -> Result<SyncBatchProgress> {
    log::info!("Running sync batch for repo {}", style(repo).green());
    let batch = api
        .create_sync_batch(repo)
        .await
        .context("Failed to sync")?;
    log::info!(
        "Created sync batch {}, waiting for updates ...",
        style(&batch.id).green()
    );

    let batch_id = batch.id.as_str();
    let progress = poll_until(poll_interval, move || async move {
        let batch = api.get_sync_batch(repo, batch_id).await?;
        let progress = SyncBatchProgress::new(batch.syncs);
        if progress.is_done() {
            return anyhow::Ok(PollStatus::Complete(progress));
        }
        log::info!(
            "Still processing, {} out of {}",
            style(progress.finished()).green(),
            style(progress.total).green()
        );
        Ok(PollStatus::Pending)
    })
    .await?;

    print_sync_result(&progress);
    Ok(progress)
}

fn print_sync_result(progress: &SyncBatchProgress) {
    let mut table = make_table(["Id", "Institution", "State"]);
    for sync in &progress.good {
        add_row(
            &mut table,
            [
                sync.id.as_str(),
                sync.item.institution_name.as_deref().unwrap_or(""),
                sync.state.as_str(),
            ],
        );
    }
    print_table("Sync finished successfully", &table);

    let mut table = make_table(["Id", "Institution", "State", "Error"]);
    for sync in &progress.bad {
        add_row(
            &mut table,
            [
                sync.id.as_str(),
                sync.item.institution_name.as_deref().unwrap_or(""),
                sync.state.as_str(),
                sync.error_message.as_deref().unwrap_or(""),
            ],
        );
    }
    print_table("Sync finished with error", &table);
}

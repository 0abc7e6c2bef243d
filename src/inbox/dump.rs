use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Result};
use console::style;

use super::config::{email_variables, InboxAction, InboxDoc};
use crate::api::{
    models::{CreateInboxDumpRequest, DumpRequestState, GetInboxDumpRequestResponse, InboxEmail},
    Downloader, InboxApi, RepoRef,
};
use crate::archive::extract_inbox_tar;
use crate::crypto::DumpKeyPair;
use crate::download::download_and_decrypt;
use crate::poll::{poll_until, PollStatus};
use crate::template::render;

/// Pages through the inbox until the server returns an empty page or no cursor
pub async fn fetch_all_emails(api: &impl InboxApi, repo: &RepoRef) -> Result<Vec<InboxEmail>> {
    let mut emails = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = api.get_inbox_emails(repo, cursor.as_deref()).await?;
        if page.emails.is_empty() {
            break;
        }
        log::debug!("Fetched {} emails", page.emails.len());
        emails.extend(page.emails);
        match page.cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(emails)
}

/// Emails whose archive file does not exist yet, mapped to their output path
/// relative to `workdir`. The first matching inbox rule decides.
pub fn compute_missing_emails(
    doc: &InboxDoc,
    emails: &[InboxEmail],
    workdir: &Path,
) -> Result<HashMap<String, PathBuf>> {
    let mut missing = HashMap::new();
    for email in emails {
        let mut matched = None;
        for config in &doc.inbox {
            if config.match_rule.matches(email)? {
                matched = Some(&config.action);
                break;
            }
        }
        let output_file = match matched {
            Some(InboxAction::Archive { output_file }) => output_file,
            Some(InboxAction::Ignore) => {
                log::debug!("Ignoring email {}", email.id);
                continue;
            }
            None => {
                log::debug!("No inbox rule matches email {}", email.id);
                continue;
            }
        };
        let output_path = PathBuf::from(render(output_file, &email_variables(email))?);
        if workdir.join(&output_path).exists() {
            continue;
        }
        missing.insert(email.id.clone(), output_path);
    }
    Ok(missing)
}

pub async fn run_inbox_dump(
    api: &impl InboxApi,
    downloader: &impl Downloader,
    repo: &RepoRef,
    poll_interval: Duration,
    doc: &InboxDoc,
    workdir: &Path,
) -> Result<usize> {
    let emails = fetch_all_emails(api, repo).await?;
    log::info!("Found {} emails in the inbox", style(emails.len()).green());
    let missing = compute_missing_emails(doc, &emails, workdir)?;
    if missing.is_empty() {
        log::info!("No missing emails found, no need to update");
        return Ok(0);
    }
    log::info!(
        "Found {} missing emails, creating dump request ...",
        style(missing.len()).green()
    );

    let keypair = DumpKeyPair::generate();
    let public_key = keypair.public_key();
    let mut email_ids: Vec<String> = missing.keys().cloned().collect();
    email_ids.sort();
    let dump = api
        .create_inbox_dump_request(
            repo,
            &CreateInboxDumpRequest {
                public_key: public_key.clone(),
                email_ids,
            },
        )
        .await?;
    log::info!(
        "Created dump {} with public_key {}, waiting for updates ...",
        style(&dump.id).green(),
        style(&public_key).green()
    );

    let dump_id = dump.id.as_str();
    let dump = poll_until(poll_interval, move || async move {
        let dump = api.get_inbox_dump_request(repo, dump_id).await?;
        anyhow::Ok(dump_poll_status(dump))
    })
    .await?;

    let sealed_key = dump
        .encryption_key
        .as_deref()
        .ok_or_else(|| anyhow!("Dump {} completed without an encryption key", dump.id))?;
    let encryption_key = keypair.open_encryption_key(sealed_key)?;
    let download_url = dump
        .download_url
        .as_deref()
        .ok_or_else(|| anyhow!("Dump {} completed without a download url", dump.id))?;
    let decrypted_file = download_and_decrypt(downloader, download_url, &encryption_key).await?;
    extract_inbox_tar(decrypted_file, &missing, workdir)?;
    Ok(missing.len())
}

fn dump_poll_status(
    dump: GetInboxDumpRequestResponse,
) -> PollStatus<GetInboxDumpRequestResponse> {
    match dump.state {
        DumpRequestState::Complete => PollStatus::Complete(dump),
        DumpRequestState::Failed => PollStatus::Failed(format!(
            "Failed to dump with error: {}",
            dump.error_message.as_deref().unwrap_or("unknown error")
        )),
        state => {
            log::debug!("State is {state:?}, keep polling...");
            PollStatus::Pending
        }
    }
}

//! `bh inbox`: archive BeanHub Inbox emails locally and extract CSV rows from them

use std::path::{Path, PathBuf};

use anyhow::Result;

pub mod config;
mod dump;
#[cfg(feature = "inbox")]
mod email;
#[cfg(feature = "inbox")]
mod extract;
#[cfg(feature = "inbox")]
mod llm;
#[cfg(feature = "inbox")]
mod report;

pub use config::InboxDoc;
pub use dump::{compute_missing_emails, fetch_all_emails, run_inbox_dump};
#[cfg(feature = "inbox")]
pub use extract::{process_inbox_imports, ExtractEvent};
#[cfg(feature = "inbox")]
pub use llm::{Llm, OllamaClient};

use crate::api::{BeanHubClient, HttpDownloader};
use crate::auth::{load_credentials, resolve_repo};
use crate::environment::Environment;

pub async fn main_dump(
    env: &Environment,
    repo: Option<&str>,
    config: &Path,
    workdir: &Path,
) -> Result<()> {
    let credentials = load_credentials(&env.config_path)?;
    let client = BeanHubClient::with_token(&env.api_base_url, credentials.access_token);
    let repo = resolve_repo(&client, repo, credentials.default_repo.as_deref()).await?;
    let doc = InboxDoc::load_or_default(config)?;
    run_inbox_dump(
        &client,
        &HttpDownloader::default(),
        &repo,
        env.poll_interval,
        &doc,
        workdir,
    )
    .await?;
    log::info!("done");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub config: PathBuf,
    pub workdir: PathBuf,
    pub model: String,
    pub keep_thinking_log: bool,
    pub debug_output_folder: Option<PathBuf>,
}

#[cfg(feature = "inbox")]
pub async fn main_extract(options: &ExtractOptions) -> Result<()> {
    use tokio::sync::mpsc::unbounded_channel;

    if let Some(folder) = &options.debug_output_folder {
        std::fs::create_dir_all(folder)?;
        log::info!(
            "Writing debugging files to {} folder",
            console::style(folder.display()).magenta()
        );
    }
    let doc = InboxDoc::load_or_default(&options.config)?;
    log::info!(
        "Extracting data with Ollama model {}",
        console::style(&options.model).green()
    );
    let llm = OllamaClient::from_env(&options.model);

    let (sender, mut receiver) = unbounded_channel();
    let engine = process_inbox_imports(&doc, &options.workdir, &llm, sender);
    let consumer = async {
        let mut reporter = report::ExtractReporter::new(
            options.keep_thinking_log,
            options.debug_output_folder.clone(),
        );
        while let Some(event) = receiver.recv().await {
            reporter.handle(event)?;
        }
        anyhow::Ok(())
    };
    let (rows, ()) = tokio::try_join!(engine, consumer)?;
    log::info!("Extracted {} rows", console::style(rows).green());
    log::info!("done");
    Ok(())
}

use std::{
    fs::File,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context as _, Result};
use console::style;

use crate::api::{
    models::{CreateDumpRequestRequest, DumpRequestState, GetDumpRequestResponse},
    ConnectApi, Downloader, RepoRef,
};
use crate::archive::extract_tar;
use crate::crypto::DumpKeyPair;
use crate::download::download_and_decrypt;
use crate::poll::{poll_until, PollStatus};

const ACCOUNTS_FILENAME: &str = "accounts.csv";

#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub workdir: PathBuf,
    pub output_accounts: Option<PathBuf>,
    pub unsafe_tar_extract: bool,
}

pub async fn run_dump(
    api: &impl ConnectApi,
    downloader: &impl Downloader,
    repo: &RepoRef,
    poll_interval: Duration,
    options: &DumpOptions,
) -> Result<()> {
    let keypair = DumpKeyPair::generate();
    let public_key = keypair.public_key();
    let dump = api
        .create_dump_request(
            repo,
            &CreateDumpRequestRequest {
                public_key: public_key.clone(),
                output_accounts: options.output_accounts.is_some(),
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
        let dump = api.get_dump_request(repo, dump_id).await?;
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

    let mut decrypted_file = download_and_decrypt(downloader, download_url, &encryption_key).await?;
    extract_tar(
        &mut decrypted_file,
        &options.workdir,
        options.unsafe_tar_extract,
    )?;

    if let Some(output_accounts) = &options.output_accounts {
        let accounts_url = dump.accounts_download_url.as_deref().ok_or_else(|| {
            anyhow!("Dump {} completed without an accounts download url", dump.id)
        })?;
        let mut decrypted_file =
            download_and_decrypt(downloader, accounts_url, &encryption_key).await?;
        let accounts_path = accounts_output_path(output_accounts);
        if let Some(parent) = accounts_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&accounts_path)
            .with_context(|| format!("Failed to create {}", accounts_path.display()))?;
        std::io::copy(&mut decrypted_file, &mut output)?;
        log::info!(
            "Wrote accounts to {}",
            style(accounts_path.display()).green()
        );
    }
    Ok(())
}

fn dump_poll_status(dump: GetDumpRequestResponse) -> PollStatus<GetDumpRequestResponse> {
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

/// An existing directory gets the default file name, anything else is taken as the file path
fn accounts_output_path(output_accounts: &Path) -> PathBuf {
    if output_accounts.is_dir() {
        output_accounts.join(ACCOUNTS_FILENAME)
    } else {
        output_accounts.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::testutils::{make_tar_gz, Member};
    use crate::connect::testutils::{FakeConnectApi, DOWNLOAD_URL, ACCOUNTS_DOWNLOAD_URL};
    use crate::crypto::testutils::{encrypt, key};
    use crate::download::testutils::FakeDownloader;

    fn repo() -> RepoRef {
        "myuser/myrepo".parse().unwrap()
    }

    fn downloader() -> FakeDownloader {
        let archive = make_tar_gz(&[
            Member::File("main.bean", b"include \"books/*.bean\"\n"),
            Member::File("import-data/connect/chase.csv", b"id,amount\n"),
        ]);
        FakeDownloader::default()
            .with_file(DOWNLOAD_URL, encrypt(&archive, &key(3)))
            .with_file(ACCOUNTS_DOWNLOAD_URL, encrypt(b"id,name\n", &key(3)))
    }

    fn options(workdir: &Path) -> DumpOptions {
        DumpOptions {
            workdir: workdir.to_path_buf(),
            output_accounts: None,
            unsafe_tar_extract: false,
        }
    }

    #[tokio::test]
    async fn dump_and_extract() {
        let tempdir = tempfile::tempdir().unwrap();
        let api = FakeConnectApi::default().with_dump_states(
            key(3),
            vec![DumpRequestState::Pending, DumpRequestState::Complete],
        );
        let downloader = downloader();

        run_dump(&api, &downloader, &repo(), Duration::ZERO, &options(tempdir.path()))
            .await
            .unwrap();

        assert_eq!(2, api.dump_fetches.get());
        assert_eq!(Some(false), api.output_accounts_requested.get());
        assert_eq!(vec![DOWNLOAD_URL.to_string()], *downloader.requested.borrow());
        assert_eq!(
            "id,amount\n",
            std::fs::read_to_string(tempdir.path().join("import-data/connect/chase.csv")).unwrap()
        );
    }

    #[tokio::test]
    async fn dump_with_accounts_into_directory() {
        let tempdir = tempfile::tempdir().unwrap();
        let accounts_dir = tempdir.path().join("accounts");
        std::fs::create_dir(&accounts_dir).unwrap();
        let api = FakeConnectApi::default()
            .with_dump_states(key(3), vec![DumpRequestState::Complete]);
        let downloader = downloader();
        let options = DumpOptions {
            output_accounts: Some(accounts_dir.clone()),
            ..options(tempdir.path())
        };

        run_dump(&api, &downloader, &repo(), Duration::ZERO, &options)
            .await
            .unwrap();

        assert_eq!(Some(true), api.output_accounts_requested.get());
        assert_eq!(
            vec![DOWNLOAD_URL.to_string(), ACCOUNTS_DOWNLOAD_URL.to_string()],
            *downloader.requested.borrow()
        );
        assert_eq!(
            "id,name\n",
            std::fs::read_to_string(accounts_dir.join("accounts.csv")).unwrap()
        );
    }

    #[tokio::test]
    async fn dump_with_accounts_into_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let accounts_path = tempdir.path().join("out").join("my-accounts.csv");
        let api = FakeConnectApi::default()
            .with_dump_states(key(3), vec![DumpRequestState::Complete]);
        let options = DumpOptions {
            output_accounts: Some(accounts_path.clone()),
            ..options(tempdir.path())
        };

        run_dump(&api, &downloader(), &repo(), Duration::ZERO, &options)
            .await
            .unwrap();
        assert_eq!("id,name\n", std::fs::read_to_string(accounts_path).unwrap());
    }

    #[tokio::test]
    async fn failed_dump() {
        let tempdir = tempfile::tempdir().unwrap();
        let api = FakeConnectApi::default().with_dump_states(
            key(3),
            vec![DumpRequestState::Processing, DumpRequestState::Failed],
        );
        let downloader = downloader();

        let err = run_dump(&api, &downloader, &repo(), Duration::ZERO, &options(tempdir.path()))
            .await
            .unwrap_err();
        assert_eq!("Failed to dump with error: MOCK_ERROR", err.to_string());
        assert!(downloader.requested.borrow().is_empty());
    }
}

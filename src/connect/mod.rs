//! `bh connect`: bank sync batches and encrypted dumps of the connect data

use anyhow::Result;

mod dump;
mod sync;

pub use dump::{run_dump, DumpOptions};
pub use sync::{run_sync, SyncBatchProgress};

use crate::api::{BeanHubClient, HttpDownloader};
use crate::auth::{load_credentials, resolve_repo};
use crate::environment::Environment;

pub async fn main_sync(env: &Environment, repo: Option<&str>) -> Result<()> {
    let credentials = load_credentials(&env.config_path)?;
    let client = BeanHubClient::with_token(&env.api_base_url, credentials.access_token);
    let repo = resolve_repo(&client, repo, credentials.default_repo.as_deref()).await?;
    run_sync(&client, &repo, env.poll_interval).await?;
    log::info!("done");
    Ok(())
}

pub async fn main_dump(
    env: &Environment,
    repo: Option<&str>,
    sync: bool,
    options: &DumpOptions,
) -> Result<()> {
    let credentials = load_credentials(&env.config_path)?;
    let client = BeanHubClient::with_token(&env.api_base_url, credentials.access_token);
    let repo = resolve_repo(&client, repo, credentials.default_repo.as_deref()).await?;
    if sync {
        run_sync(&client, &repo, env.poll_interval).await?;
    }
    run_dump(
        &client,
        &HttpDownloader::default(),
        &repo,
        env.poll_interval,
        options,
    )
    .await?;
    log::info!("done");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutils {
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
    };

    use crate::api::{
        models::{
            CreateDumpRequestRequest, CreateDumpRequestResponse, CreateSyncBatchResponse,
            DumpRequestState, GetDumpRequestResponse, GetSyncBatchResponse, ItemData,
            PlaidItemSyncState, SyncData,
        },
        ApiError, ConnectApi, RepoRef,
    };
    use crate::crypto::{testutils::seal_encryption_key, EncryptionKey};

    pub const DOWNLOAD_URL: &str = "https://storage.example.com/dump.tar.gz.enc";
    pub const ACCOUNTS_DOWNLOAD_URL: &str = "https://storage.example.com/accounts.csv.enc";

    /// Plays back queued sync batch and dump states, sealing the dump key for
    /// whatever public key the client sent
    #[derive(Default)]
    pub struct FakeConnectApi {
        sync_batches: RefCell<VecDeque<GetSyncBatchResponse>>,
        pub sync_batches_created: RefCell<Vec<String>>,
        pub sync_batch_fetches: Cell<usize>,
        dump_states: RefCell<VecDeque<DumpRequestState>>,
        dump_key: Option<EncryptionKey>,
        public_key: RefCell<Option<String>>,
        pub output_accounts_requested: Cell<Option<bool>>,
        pub dump_fetches: Cell<usize>,
    }

    impl FakeConnectApi {
        pub fn with_sync_batches(self, batches: Vec<GetSyncBatchResponse>) -> Self {
            *self.sync_batches.borrow_mut() = batches.into();
            self
        }

        pub fn with_dump_states(mut self, key: EncryptionKey, states: Vec<DumpRequestState>) -> Self {
            self.dump_key = Some(key);
            *self.dump_states.borrow_mut() = states.into();
            self
        }
    }

    pub fn sync_batch(states: &[PlaidItemSyncState]) -> GetSyncBatchResponse {
        GetSyncBatchResponse {
            id: "batch0".to_string(),
            syncs: states
                .iter()
                .enumerate()
                .map(|(index, state)| SyncData {
                    id: format!("sync{index}"),
                    state: *state,
                    item: ItemData {
                        id: format!("item{index}"),
                        institution_name: Some(format!("Bank {index}")),
                    },
                    error_message: state.is_bad_terminal().then(|| "MOCK_ERROR".to_string()),
                })
                .collect(),
        }
    }

    impl ConnectApi for FakeConnectApi {
        async fn create_sync_batch(
            &self,
            repo: &RepoRef,
        ) -> Result<CreateSyncBatchResponse, ApiError> {
            self.sync_batches_created.borrow_mut().push(repo.to_string());
            Ok(CreateSyncBatchResponse {
                id: "batch0".to_string(),
            })
        }

        async fn get_sync_batch(
            &self,
            _repo: &RepoRef,
            batch_id: &str,
        ) -> Result<GetSyncBatchResponse, ApiError> {
            assert_eq!("batch0", batch_id);
            self.sync_batch_fetches.set(self.sync_batch_fetches.get() + 1);
            Ok(self
                .sync_batches
                .borrow_mut()
                .pop_front()
                .expect("Fetched sync batch more often than expected"))
        }

        async fn create_dump_request(
            &self,
            _repo: &RepoRef,
            request: &CreateDumpRequestRequest,
        ) -> Result<CreateDumpRequestResponse, ApiError> {
            *self.public_key.borrow_mut() = Some(request.public_key.clone());
            self.output_accounts_requested
                .set(Some(request.output_accounts));
            Ok(CreateDumpRequestResponse {
                id: "dump0".to_string(),
            })
        }

        async fn get_dump_request(
            &self,
            _repo: &RepoRef,
            dump_id: &str,
        ) -> Result<GetDumpRequestResponse, ApiError> {
            assert_eq!("dump0", dump_id);
            self.dump_fetches.set(self.dump_fetches.get() + 1);
            let state = self
                .dump_states
                .borrow_mut()
                .pop_front()
                .expect("Fetched dump more often than expected");
            let mut response = GetDumpRequestResponse {
                id: dump_id.to_string(),
                state,
                encryption_key: None,
                download_url: None,
                accounts_download_url: None,
                error_message: None,
            };
            match state {
                DumpRequestState::Complete => {
                    let public_key = self.public_key.borrow().clone().unwrap();
                    let key = self.dump_key.as_ref().unwrap();
                    response.encryption_key = Some(seal_encryption_key(&public_key, key));
                    response.download_url = Some(DOWNLOAD_URL.to_string());
                    if self.output_accounts_requested.get() == Some(true) {
                        response.accounts_download_url = Some(ACCOUNTS_DOWNLOAD_URL.to_string());
                    }
                }
                DumpRequestState::Failed => {
                    response.error_message = Some("MOCK_ERROR".to_string());
                }
                _ => {}
            }
            Ok(response)
        }
    }
}

//! BeanHub HTTP API: request/response models, the reqwest-backed client and
//! the traits the commands are written against.

use std::{fmt::Display, io::Write, str::FromStr};

use anyhow::{bail, Result};

mod client;
mod error;
pub mod models;

pub use client::{BeanHubClient, HttpDownloader};
pub use error::ApiError;

use models::{
    AuthSessionPollResponse, AuthSessionResponse, CreateDumpRequestRequest,
    CreateDumpRequestResponse, CreateInboxDumpRequest, CreateInboxDumpRequestResponse,
    CreateSyncBatchResponse, GetDumpRequestResponse, GetInboxDumpRequestResponse,
    GetInboxEmailResponse, GetSyncBatchResponse, Repository,
};

/// Repository reference in "<username>/<repo_name>" form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub username: String,
    pub name: String,
}

impl FromStr for RepoRef {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.split_once('/') {
            Some((username, name))
                if !username.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    username: username.to_string(),
                    name: name.to_string(),
                })
            }
            _ => bail!(
                "Invalid repo {value:?}, expected \"<username>/<repo_name>\" format, such as \"myuser/myrepo\""
            ),
        }
    }
}

impl Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.username, self.name)
    }
}

#[derive(Debug)]
pub enum AuthSessionPoll {
    NotReady,
    Granted(AuthSessionPollResponse),
    Unexpected(u16),
}

#[allow(async_fn_in_trait)]
pub trait AuthApi {
    async fn create_auth_session(&self, hostname: &str) -> Result<AuthSessionResponse, ApiError>;
    async fn poll_auth_session(
        &self,
        session: &AuthSessionResponse,
    ) -> Result<AuthSessionPoll, ApiError>;
}

#[allow(async_fn_in_trait)]
pub trait RepoApi {
    async fn list_repositories(&self) -> Result<Vec<Repository>, ApiError>;
}

#[allow(async_fn_in_trait)]
pub trait ConnectApi {
    async fn create_sync_batch(&self, repo: &RepoRef) -> Result<CreateSyncBatchResponse, ApiError>;
    async fn get_sync_batch(
        &self,
        repo: &RepoRef,
        batch_id: &str,
    ) -> Result<GetSyncBatchResponse, ApiError>;
    async fn create_dump_request(
        &self,
        repo: &RepoRef,
        request: &CreateDumpRequestRequest,
    ) -> Result<CreateDumpRequestResponse, ApiError>;
    async fn get_dump_request(
        &self,
        repo: &RepoRef,
        dump_id: &str,
    ) -> Result<GetDumpRequestResponse, ApiError>;
}

#[allow(async_fn_in_trait)]
pub trait InboxApi {
    async fn get_inbox_emails(
        &self,
        repo: &RepoRef,
        cursor: Option<&str>,
    ) -> Result<GetInboxEmailResponse, ApiError>;
    async fn create_inbox_dump_request(
        &self,
        repo: &RepoRef,
        request: &CreateInboxDumpRequest,
    ) -> Result<CreateInboxDumpRequestResponse, ApiError>;
    async fn get_inbox_dump_request(
        &self,
        repo: &RepoRef,
        dump_id: &str,
    ) -> Result<GetInboxDumpRequestResponse, ApiError>;
}

/// Fetches pre-signed download URLs. Those are not BeanHub API calls and carry no access token.
#[allow(async_fn_in_trait)]
pub trait Downloader {
    async fn download(&self, url: &str, output: &mut dyn Write) -> Result<u64>;
}

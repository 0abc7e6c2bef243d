use std::io::Write;

use anyhow::{Context as _, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::{
    models::{
        AuthSessionPollResponse, AuthSessionRequest, AuthSessionResponse,
        CreateDumpRequestRequest, CreateDumpRequestResponse, CreateInboxDumpRequest,
        CreateInboxDumpRequestResponse, CreateSyncBatchResponse, GenericError,
        GetDumpRequestResponse, GetInboxDumpRequestResponse, GetInboxEmailResponse,
        GetSyncBatchResponse, ListRepositoriesResponse, Repository,
    },
    ApiError, AuthApi, AuthSessionPoll, ConnectApi, Downloader, InboxApi, RepoApi, RepoRef,
};
use crate::config::AccessToken;

const ACCESS_TOKEN_HEADER: &str = "access-token";

pub struct BeanHubClient {
    client: Client,
    base_url: String,
    access_token: Option<AccessToken>,
}

impl BeanHubClient {
    /// Client for the endpoints that don't need authentication, i.e. the login flow
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    pub fn with_token(base_url: &str, access_token: AccessToken) -> Self {
        Self {
            access_token: Some(access_token),
            ..Self::new(base_url)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn repo_url(&self, repo: &RepoRef, path: &str) -> String {
        self.url(&format!("v1/repos/{}/{}/{}", repo.username, repo.name, path))
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.header(ACCESS_TOKEN_HEADER, token.get()),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
        log::debug!("GET {url}");
        let response = self.authenticated(self.client.get(url)).send().await?;
        parse_response(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: String,
        body: &impl serde::Serialize,
    ) -> Result<T, ApiError> {
        log::debug!("POST {url}");
        let response = self
            .authenticated(self.client.post(url))
            .json(body)
            .send()
            .await?;
        parse_response(response).await
    }
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let content = response.text().await?;
    let detail = error_detail(&content);
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        return Err(ApiError::Validation { detail });
    }
    Err(ApiError::UnexpectedStatus {
        status: status.as_u16(),
        detail,
    })
}

/// Pulls `detail` out of a generic error body, falls back to the raw content
fn error_detail(content: &str) -> String {
    match serde_json::from_str::<GenericError>(content) {
        Ok(GenericError {
            detail: Some(serde_json::Value::String(detail)),
        }) => detail,
        Ok(GenericError {
            detail: Some(detail),
        }) => detail.to_string(),
        _ => content.to_string(),
    }
}

impl AuthApi for BeanHubClient {
    async fn create_auth_session(&self, hostname: &str) -> Result<AuthSessionResponse, ApiError> {
        self.post(
            self.url("v1/auth/sessions"),
            &AuthSessionRequest {
                hostname: hostname.to_string(),
            },
        )
        .await
    }

    async fn poll_auth_session(
        &self,
        session: &AuthSessionResponse,
    ) -> Result<AuthSessionPoll, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("v1/auth/sessions/{}/poll", session.id)))
            .query(&[("secret_token", &session.secret_token)])
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(AuthSessionPoll::Granted(
                response.json::<AuthSessionPollResponse>().await?,
            )),
            StatusCode::ACCEPTED => Ok(AuthSessionPoll::NotReady),
            status => Ok(AuthSessionPoll::Unexpected(status.as_u16())),
        }
    }
}

impl RepoApi for BeanHubClient {
    async fn list_repositories(&self) -> Result<Vec<Repository>, ApiError> {
        let response: ListRepositoriesResponse = self.get(self.url("v1/repos")).await?;
        Ok(response.repositories)
    }
}

impl ConnectApi for BeanHubClient {
    async fn create_sync_batch(&self, repo: &RepoRef) -> Result<CreateSyncBatchResponse, ApiError> {
        self.post(
            self.repo_url(repo, "connect/sync_batches"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn get_sync_batch(
        &self,
        repo: &RepoRef,
        batch_id: &str,
    ) -> Result<GetSyncBatchResponse, ApiError> {
        self.get(self.repo_url(repo, &format!("connect/sync_batches/{batch_id}")))
            .await
    }

    async fn create_dump_request(
        &self,
        repo: &RepoRef,
        request: &CreateDumpRequestRequest,
    ) -> Result<CreateDumpRequestResponse, ApiError> {
        self.post(self.repo_url(repo, "connect/dumps"), request)
            .await
    }

    async fn get_dump_request(
        &self,
        repo: &RepoRef,
        dump_id: &str,
    ) -> Result<GetDumpRequestResponse, ApiError> {
        self.get(self.repo_url(repo, &format!("connect/dumps/{dump_id}")))
            .await
    }
}

impl InboxApi for BeanHubClient {
    async fn get_inbox_emails(
        &self,
        repo: &RepoRef,
        cursor: Option<&str>,
    ) -> Result<GetInboxEmailResponse, ApiError> {
        let mut url = self.repo_url(repo, "inbox/emails");
        if let Some(cursor) = cursor {
            url = reqwest::Url::parse_with_params(&url, &[("cursor", cursor)])
                .map(String::from)
                .unwrap_or_else(|_| format!("{url}?cursor={cursor}"));
        }
        self.get(url).await
    }

    async fn create_inbox_dump_request(
        &self,
        repo: &RepoRef,
        request: &CreateInboxDumpRequest,
    ) -> Result<CreateInboxDumpRequestResponse, ApiError> {
        self.post(self.repo_url(repo, "inbox/dumps"), request).await
    }

    async fn get_inbox_dump_request(
        &self,
        repo: &RepoRef,
        dump_id: &str,
    ) -> Result<GetInboxDumpRequestResponse, ApiError> {
        self.get(self.repo_url(repo, &format!("inbox/dumps/{dump_id}")))
            .await
    }
}

#[derive(Default)]
pub struct HttpDownloader {
    client: Client,
}

impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, output: &mut dyn Write) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .context("Failed to download file")?;

        let progress = match response.content_length() {
            Some(total) => ProgressBar::new(total).with_style(
                ProgressStyle::with_template("{spinner} {bytes}/{total_bytes} [{wide_bar}] {eta}")?,
            ),
            None => ProgressBar::new_spinner(),
        };
        let mut downloaded = 0;
        while let Some(chunk) = response.chunk().await? {
            output.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }
        output.flush()?;
        progress.finish_and_clear();
        log::debug!("Downloaded {downloaded} bytes");
        Ok(downloaded)
    }
}

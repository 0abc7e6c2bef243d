use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug, Clone)]
pub struct AuthSessionRequest {
    pub hostname: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthSessionResponse {
    pub id: String,
    pub code: String,
    pub auth_url: String,
    pub secret_token: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthSessionPollResponse {
    pub token: String,
    #[serde(default)]
    pub repositories: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateSyncBatchResponse {
    pub id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetSyncBatchResponse {
    pub id: String,
    pub syncs: Vec<SyncData>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SyncData {
    pub id: String,
    pub state: PlaidItemSyncState,
    pub item: ItemData,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ItemData {
    pub id: String,
    #[serde(default)]
    pub institution_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaidItemSyncState {
    Pending,
    Processing,
    SyncComplete,
    SyncFailed,
    ImportComplete,
    ImportCompleteNoChanges,
    ImportFailed,
}

impl PlaidItemSyncState {
    pub fn is_good_terminal(self) -> bool {
        matches!(self, Self::ImportComplete | Self::ImportCompleteNoChanges)
    }

    pub fn is_bad_terminal(self) -> bool {
        matches!(self, Self::ImportFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::SyncComplete => "SYNC_COMPLETE",
            Self::SyncFailed => "SYNC_FAILED",
            Self::ImportComplete => "IMPORT_COMPLETE",
            Self::ImportCompleteNoChanges => "IMPORT_COMPLETE_NO_CHANGES",
            Self::ImportFailed => "IMPORT_FAILED",
        }
    }
}

impl std::fmt::Display for PlaidItemSyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared by connect dumps and inbox dumps
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DumpRequestState {
    Pending,
    Processing,
    Complete,
    Failed,
}

#[derive(Serialize, Debug, Clone)]
pub struct CreateDumpRequestRequest {
    pub public_key: String,
    pub output_accounts: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateDumpRequestResponse {
    pub id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetDumpRequestResponse {
    pub id: String,
    pub state: DumpRequestState,
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub accounts_download_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CreateInboxDumpRequest {
    pub public_key: String,
    pub email_ids: Vec<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreateInboxDumpRequestResponse {
    pub id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetInboxDumpRequestResponse {
    pub id: String,
    pub state: DumpRequestState,
    #[serde(default)]
    pub encryption_key: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InboxEmail {
    pub id: String,
    pub message_id: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub subject: String,
    pub from_addresses: Vec<String>,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GetInboxEmailResponse {
    pub emails: Vec<InboxEmail>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ListRepositoriesResponse {
    pub repositories: Vec<Repository>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Repository {
    pub username: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub repo_type: Option<String>,
    #[serde(default)]
    pub public: bool,
    pub active: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GenericError {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

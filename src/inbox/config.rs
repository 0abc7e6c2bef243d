use std::path::Path;

use anyhow::{Context as _, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::models::InboxEmail;
use crate::template::Variables;

pub const DEFAULT_OUTPUT_FILE: &str = "inbox-data/default/{{ id }}.eml";

/// `.beanhub/inbox.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboxDoc {
    #[serde(default)]
    pub inbox: Vec<InboxConfig>,
    #[serde(default)]
    pub import: Vec<InboxImportRule>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

impl Default for InboxDoc {
    /// Archives every email
    fn default() -> Self {
        Self {
            inbox: vec![InboxConfig {
                match_rule: InboxMatch::default(),
                action: InboxAction::Archive {
                    output_file: DEFAULT_OUTPUT_FILE.to_string(),
                },
            }],
            import: Vec::new(),
            columns: Vec::new(),
        }
    }
}

impl InboxDoc {
    /// Falls back to the default doc when there is no file at `path`
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "The inbox doc at {} does not exist, use default config",
                console::style(path.display()).green()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inbox doc {}", path.display()))?;
        let doc = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse inbox doc {}", path.display()))?;
        log::info!(
            "Loaded inbox doc from {}",
            console::style(path.display()).green()
        );
        Ok(doc)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxConfig {
    #[serde(rename = "match", default)]
    pub match_rule: InboxMatch,
    pub action: InboxAction,
}

/// Every given condition has to hold. Regexes are anchored at the start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboxMatch {
    /// All of these tags have to be on the email
    pub tags: Option<Vec<String>>,
    pub subject: Option<String>,
    pub from_address: Option<String>,
}

impl InboxMatch {
    pub fn matches(&self, email: &InboxEmail) -> Result<bool> {
        if let Some(tags) = &self.tags {
            let email_tags = email.tags.as_deref().unwrap_or_default();
            if !tags.iter().all(|tag| email_tags.contains(tag)) {
                return Ok(false);
            }
        }
        if let Some(subject) = &self.subject {
            if !anchored(subject)?.is_match(&email.subject) {
                return Ok(false);
            }
        }
        if let Some(from_address) = &self.from_address {
            let regex = anchored(from_address)?;
            if !email.from_addresses.iter().any(|address| regex.is_match(address)) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})")).with_context(|| format!("Invalid regex {pattern:?}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboxAction {
    /// `output_file` is a template relative to the workdir
    Archive { output_file: String },
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxImportRule {
    pub name: Option<String>,
    #[serde(rename = "match", default)]
    pub match_rule: InboxImportMatch,
    pub actions: Vec<ImportAction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboxImportMatch {
    /// Glob against the `.eml` path relative to the workdir
    pub input_file: Option<String>,
    pub subject: Option<String>,
    pub from_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImportAction {
    Extract {
        output_csv: String,
        prompt: Option<String>,
    },
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Str,
    Int,
    Decimal,
    Date,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Str => "str",
            ColumnType::Int => "int",
            ColumnType::Decimal => "decimal",
            ColumnType::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub description: String,
    pub regex: Option<String>,
}

/// Template variables describing an email
pub fn email_variables(email: &InboxEmail) -> Variables {
    let mut variables = Variables::new();
    variables.insert("id".to_string(), email.id.clone());
    variables.insert("message_id".to_string(), email.message_id.clone());
    variables.insert("subject".to_string(), email.subject.clone());
    variables.insert(
        "from_address".to_string(),
        email.from_addresses.first().cloned().unwrap_or_default(),
    );
    variables.insert("recipients".to_string(), email.recipients.join(", "));
    variables.insert(
        "tags".to_string(),
        email.tags.as_deref().unwrap_or_default().join(","),
    );
    variables
}

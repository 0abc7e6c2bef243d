use std::{collections::BTreeMap, path::Path};

use anyhow::{Context as _, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `.beanhub/imports.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportDoc {
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub imports: Vec<ImportRule>,
}

impl ImportDoc {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read import doc {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse import doc {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Glob relative to the workdir
    #[serde(rename = "match")]
    pub match_pattern: String,
    #[serde(default)]
    pub config: InputConfigDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfigDetails {
    pub default_file: Option<String>,
    #[serde(default)]
    pub prepend_postings: Vec<PostingTemplate>,
    #[serde(default)]
    pub append_postings: Vec<PostingTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRule {
    pub name: Option<String>,
    #[serde(rename = "match")]
    pub match_rule: BTreeMap<String, StrMatch>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StrMatch {
    /// Regular expression anchored at the start of the value
    Regex(String),
    Equals { equals: String },
    OneOf { one_of: Vec<String> },
}

impl StrMatch {
    pub fn compile(&self) -> Result<CompiledMatch> {
        Ok(match self {
            StrMatch::Regex(pattern) => CompiledMatch::Regex(
                Regex::new(&format!("^(?:{pattern})"))
                    .with_context(|| format!("Invalid regex {pattern:?}"))?,
            ),
            StrMatch::Equals { equals } => CompiledMatch::Equals(equals.clone()),
            StrMatch::OneOf { one_of } => CompiledMatch::OneOf(one_of.clone()),
        })
    }
}

#[derive(Debug, Clone)]
pub enum CompiledMatch {
    Regex(Regex),
    Equals(String),
    OneOf(Vec<String>),
}

impl CompiledMatch {
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            CompiledMatch::Regex(regex) => regex.is_match(value),
            CompiledMatch::Equals(expected) => expected == value,
            CompiledMatch::OneOf(options) => options.iter().any(|option| option == value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    AddTxn {
        /// Target file template, defaults to the input's `default_file`
        file: Option<String>,
        txn: TxnTemplate,
    },
    Ignore,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxnTemplate {
    pub id: Option<String>,
    pub date: Option<String>,
    pub flag: Option<String>,
    pub payee: Option<String>,
    pub narration: Option<String>,
    #[serde(default)]
    pub postings: Vec<PostingTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingTemplate {
    pub account: String,
    pub amount: Option<AmountTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountTemplate {
    pub number: String,
    pub currency: String,
}

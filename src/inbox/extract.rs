//! Extraction of CSV rows from archived emails with a local LLM.
//!
//! [`process_inbox_imports`] walks the `.eml` files below the workdir and reports
//! what it does as [`ExtractEvent`]s, so the caller decides how to render
//! progress. The thinking output of the model is streamed piece by piece.

use std::{
    collections::HashSet,
    fs::OpenOptions,
    path::{Path, PathBuf},
    str::FromStr as _,
};

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::mpsc::UnboundedSender;

use super::config::{anchored, ColumnConfig, ColumnType, ImportAction, InboxDoc, InboxImportRule};
use super::email::EmailFile;
use super::llm::Llm;
use crate::glob::{find_files, glob_to_regex, relative_slash_path};
use crate::template::{render, Variables};

pub const ID_COLUMN: &str = "id";
const THINK_END: &str = "</think>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractEvent {
    StartProcessingEmail {
        email_id: String,
        subject: String,
    },
    NoMatch {
        email_id: String,
    },
    MatchImportRule {
        rule_index: usize,
        rule_name: Option<String>,
    },
    IgnoreEmail {
        email_id: String,
    },
    CsvRowExists {
        email_id: String,
        output_csv: PathBuf,
    },
    StartExtractingColumn {
        column: String,
    },
    StartThinking {
        email_id: String,
        column: String,
        prompt: String,
    },
    UpdateThinking {
        piece: String,
    },
    FinishThinking {
        email_id: String,
        column: String,
        thinking: String,
    },
    FinishExtractingColumn {
        column: String,
        value: String,
    },
    FinishExtractingRow {
        output_csv: PathBuf,
        row: Vec<(String, String)>,
    },
}

/// Runs every matching extract action. Returns the number of rows written.
///
/// A closed receiver does not stop the run.
pub async fn process_inbox_imports(
    doc: &InboxDoc,
    workdir: &Path,
    llm: &impl Llm,
    events: UnboundedSender<ExtractEvent>,
) -> Result<usize> {
    let emit = |event: ExtractEvent| {
        let _ = events.send(event);
    };
    let rules = CompiledRules::compile(&doc.import)?;
    let mut rows = 0;
    for path in find_files(workdir, "**/*.eml")? {
        let email = EmailFile::load(&path)?;
        emit(ExtractEvent::StartProcessingEmail {
            email_id: email.id.clone(),
            subject: email.subject.clone(),
        });
        let relative = relative_slash_path(workdir, &path).unwrap_or_default();
        let Some(rule_index) = rules.find(&relative, &email) else {
            emit(ExtractEvent::NoMatch {
                email_id: email.id.clone(),
            });
            continue;
        };
        let rule = &doc.import[rule_index];
        emit(ExtractEvent::MatchImportRule {
            rule_index,
            rule_name: rule.name.clone(),
        });

        for action in &rule.actions {
            let (output_csv, extra_prompt) = match action {
                ImportAction::Ignore => {
                    emit(ExtractEvent::IgnoreEmail {
                        email_id: email.id.clone(),
                    });
                    continue;
                }
                ImportAction::Extract { output_csv, prompt } => (output_csv, prompt.as_deref()),
            };
            let output_csv = PathBuf::from(render(output_csv, &email_template_variables(&email, &relative))?);
            let output_path = workdir.join(&output_csv);
            if existing_ids(&output_path)?.contains(&email.id) {
                emit(ExtractEvent::CsvRowExists {
                    email_id: email.id.clone(),
                    output_csv,
                });
                continue;
            }

            let mut row = vec![(ID_COLUMN.to_string(), email.id.clone())];
            for column in &doc.columns {
                emit(ExtractEvent::StartExtractingColumn {
                    column: column.name.clone(),
                });
                let prompt = build_prompt(&email, column, extra_prompt);
                emit(ExtractEvent::StartThinking {
                    email_id: email.id.clone(),
                    column: column.name.clone(),
                    prompt: prompt.clone(),
                });
                let thinking = llm
                    .generate(&prompt, &mut |piece| {
                        emit(ExtractEvent::UpdateThinking {
                            piece: piece.to_string(),
                        })
                    })
                    .await
                    .with_context(|| {
                        format!("Failed to extract {} from email {}", column.name, email.id)
                    })?;
                emit(ExtractEvent::FinishThinking {
                    email_id: email.id.clone(),
                    column: column.name.clone(),
                    thinking: thinking.clone(),
                });
                let value = parse_value(&thinking, column)?;
                emit(ExtractEvent::FinishExtractingColumn {
                    column: column.name.clone(),
                    value: value.clone(),
                });
                row.push((column.name.clone(), value));
            }
            append_row(&output_path, &doc.columns, &row)?;
            rows += 1;
            emit(ExtractEvent::FinishExtractingRow { output_csv, row });
        }
    }
    Ok(rows)
}

struct CompiledRule {
    input_file: Option<regex::Regex>,
    subject: Option<regex::Regex>,
    from_address: Option<regex::Regex>,
}

struct CompiledRules(Vec<CompiledRule>);

impl CompiledRules {
    fn compile(rules: &[InboxImportRule]) -> Result<Self> {
        let compiled = rules
            .iter()
            .map(|rule| {
                let match_rule = &rule.match_rule;
                Ok(CompiledRule {
                    input_file: match_rule.input_file.as_deref().map(glob_to_regex).transpose()?,
                    subject: match_rule.subject.as_deref().map(anchored).transpose()?,
                    from_address: match_rule.from_address.as_deref().map(anchored).transpose()?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self(compiled))
    }

    /// Index of the first rule matching the email
    fn find(&self, relative_path: &str, email: &EmailFile) -> Option<usize> {
        self.0.iter().position(|rule| {
            rule.input_file
                .as_ref()
                .is_none_or(|regex| regex.is_match(relative_path))
                && rule
                    .subject
                    .as_ref()
                    .is_none_or(|regex| regex.is_match(&email.subject))
                && rule.from_address.as_ref().is_none_or(|regex| {
                    email
                        .from_addresses
                        .iter()
                        .any(|address| regex.is_match(address))
                })
        })
    }
}

fn email_template_variables(email: &EmailFile, relative_path: &str) -> Variables {
    let mut variables = Variables::new();
    variables.insert("id".to_string(), email.id.clone());
    variables.insert("subject".to_string(), email.subject.clone());
    variables.insert(
        "from_address".to_string(),
        email.from_addresses.first().cloned().unwrap_or_default(),
    );
    variables.insert("input_file".to_string(), relative_path.to_string());
    variables
}

pub fn build_prompt(email: &EmailFile, column: &ColumnConfig, extra_prompt: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str("# Instructions\n\n");
    prompt.push_str(&format!(
        "Extract the value of the column `{}` from the email below.\n\n",
        column.name
    ));
    prompt.push_str(&format!("Column description: {}\n", column.description));
    prompt.push_str(&format!("Column type: {}\n", column.column_type.as_str()));
    if column.column_type == ColumnType::Date {
        prompt.push_str("Date format: YYYY-MM-DD\n");
    }
    if let Some(regex) = &column.regex {
        prompt.push_str(&format!("The value must match the regex: {regex}\n"));
    }
    if let Some(extra_prompt) = extra_prompt {
        prompt.push('\n');
        prompt.push_str(extra_prompt.trim());
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "\nThink it through, then output only the value after the {THINK_END} tag, without any other text.\n\n"
    ));
    prompt.push_str("# Email\n\n");
    prompt.push_str(&format!("Subject: {}\n", email.subject));
    prompt.push_str(&format!("From: {}\n\n", email.from_addresses.join(", ")));
    prompt.push_str(email.body.trim());
    prompt.push('\n');
    prompt
}

/// Takes the text after `</think>` and normalizes it to the column type.
///
/// Unparsable values are logged and written as empty cells.
pub fn parse_value(output: &str, column: &ColumnConfig) -> Result<String> {
    let answer = match output.rfind(THINK_END) {
        Some(position) => &output[position + THINK_END.len()..],
        None => output,
    };
    let mut answer = answer.trim().trim_matches('`').trim();
    if let Some(regex) = &column.regex {
        let regex = regex::Regex::new(regex)
            .with_context(|| format!("Invalid regex for column {}", column.name))?;
        answer = regex.find(answer).map(|found| found.as_str()).unwrap_or_default();
    }
    let normalized = match column.column_type {
        ColumnType::Str => Some(answer.to_string()),
        ColumnType::Int => answer
            .replace(',', "")
            .parse::<i64>()
            .ok()
            .map(|value| value.to_string()),
        ColumnType::Decimal => Decimal::from_str(&answer.replace([',', '$'], ""))
            .ok()
            .map(|value| value.to_string()),
        ColumnType::Date => NaiveDate::parse_from_str(answer, "%Y-%m-%d")
            .ok()
            .map(|date| date.to_string()),
    };
    Ok(normalized.unwrap_or_else(|| {
        log::warn!(
            "Cannot parse {answer:?} as {} for column {}",
            column.column_type.as_str(),
            column.name
        );
        String::new()
    }))
}

fn existing_ids(path: &Path) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let Some(id_index) = reader.headers()?.iter().position(|header| header == ID_COLUMN) else {
        return Ok(HashSet::new());
    };
    let mut ids = HashSet::new();
    for record in reader.records() {
        if let Some(id) = record?.get(id_index) {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}

fn append_row(path: &Path, columns: &[ColumnConfig], row: &[(String, String)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let is_new = std::fs::metadata(path).map_or(true, |metadata| metadata.len() == 0);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if is_new {
        writer.write_record(
            std::iter::once(ID_COLUMN).chain(columns.iter().map(|column| column.name.as_str())),
        )?;
    }
    writer.write_record(row.iter().map(|(_, value)| value))?;
    writer.flush()?;
    Ok(())
}

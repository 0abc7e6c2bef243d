use std::path::PathBuf;

use anyhow::{Context as _, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::extract::ExtractEvent;

const THINK_MARKERS: [&str; 2] = ["<think>", "</think>"];
const SPINNER_TICK: std::time::Duration = std::time::Duration::from_millis(100);

/// Renders extraction events on the terminal and writes prompt/thinking
/// debug files when asked to
pub struct ExtractReporter {
    keep_thinking_log: bool,
    debug_output_folder: Option<PathBuf>,
    spinner: Option<ProgressBar>,
    think_log: String,
}

impl ExtractReporter {
    pub fn new(keep_thinking_log: bool, debug_output_folder: Option<PathBuf>) -> Self {
        Self {
            keep_thinking_log,
            debug_output_folder,
            spinner: None,
            think_log: String::new(),
        }
    }

    pub fn handle(&mut self, event: ExtractEvent) -> Result<()> {
        match event {
            ExtractEvent::StartProcessingEmail { email_id, subject } => log::info!(
                "Processing email {} subject: {}",
                style(email_id).green(),
                style(subject).blue()
            ),
            ExtractEvent::NoMatch { email_id } => log::info!(
                "No import rule matched for email {}",
                style(email_id).green()
            ),
            ExtractEvent::MatchImportRule {
                rule_index,
                rule_name,
            } => log::info!(
                "Import rule {} matched",
                style(rule_name.unwrap_or_else(|| rule_index.to_string())).green()
            ),
            ExtractEvent::IgnoreEmail { email_id } => log::info!(
                "Ignore email {} as instructed by import action",
                style(email_id).green()
            ),
            ExtractEvent::CsvRowExists {
                email_id,
                output_csv,
            } => log::info!(
                "Skip processing email {} as it exists in the output CSV file {} already",
                style(email_id).green(),
                style(output_csv.display()).green()
            ),
            ExtractEvent::StartExtractingColumn { column } => {
                log::info!("Extracting column {}", style(column).blue())
            }
            ExtractEvent::StartThinking {
                email_id,
                column,
                prompt,
            } => {
                self.write_debug_file(&format!("{email_id}-{column}-prompt.txt"), "prompt", &prompt)?;
                self.think_log.clear();
                let spinner = ProgressBar::new_spinner()
                    .with_style(
                        ProgressStyle::with_template("{spinner} Thinking ... {wide_msg}")
                            .context("Invalid spinner template")?,
                    )
                    .with_message("");
                spinner.enable_steady_tick(SPINNER_TICK);
                self.spinner = Some(spinner);
            }
            ExtractEvent::UpdateThinking { piece } => {
                if !THINK_MARKERS.contains(&piece.as_str()) {
                    self.think_log.push_str(&piece);
                    if let Some(spinner) = &self.spinner {
                        spinner.set_message(last_line(&self.think_log).to_string());
                    }
                }
            }
            ExtractEvent::FinishThinking {
                email_id,
                column,
                thinking,
            } => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.finish_and_clear();
                }
                if self.keep_thinking_log {
                    println!("{}", style("Thinking ...").bold());
                    println!("{}", self.think_log.trim());
                }
                self.write_debug_file(
                    &format!("{email_id}-{column}-thinking.txt"),
                    "thinking",
                    &thinking,
                )?;
            }
            ExtractEvent::FinishExtractingColumn { column, value } => {
                log::info!("  {} = {}", style(column).blue(), style(value).green())
            }
            ExtractEvent::FinishExtractingRow { output_csv, row } => {
                let row: serde_json::Map<String, serde_json::Value> = row
                    .into_iter()
                    .map(|(key, value)| (key, serde_json::Value::String(value)))
                    .collect();
                log::info!(
                    "Finished extracting row into {} {}",
                    style(output_csv.display()).green(),
                    serde_json::to_string_pretty(&row)?
                );
            }
        }
        Ok(())
    }

    fn write_debug_file(&self, filename: &str, what: &str, content: &str) -> Result<()> {
        let Some(folder) = &self.debug_output_folder else {
            return Ok(());
        };
        let path = folder.join(filename);
        log::info!("Write {what} to {}", style(path.display()).magenta());
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn last_line(text: &str) -> &str {
    text.trim_end().lines().last().unwrap_or_default()
}

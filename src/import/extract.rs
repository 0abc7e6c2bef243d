use std::path::Path;

use anyhow::{Context as _, Result};

use crate::glob::relative_slash_path;
use crate::template::Variables;

pub const CSV_EXTRACTOR: &str = "csv";

/// One CSV row with its columns as template variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRow {
    pub file: String,
    pub lineno: usize,
    pub variables: Variables,
}

pub fn normalize_column_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Header driven extraction. Besides the columns every row gets `file`
/// (relative to `workdir`), `lineno` (1 for the first data row) and `extractor`.
pub fn extract_csv(workdir: &Path, path: &Path) -> Result<Vec<ExtractedRow>> {
    let file = relative_slash_path(workdir, path)
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(normalize_column_name)
        .collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
        let lineno = index + 1;
        let mut variables: Variables = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        variables.insert("file".to_string(), file.clone());
        variables.insert("lineno".to_string(), lineno.to_string());
        variables.insert("extractor".to_string(), CSV_EXTRACTOR.to_string());
        rows.push(ExtractedRow {
            file: file.clone(),
            lineno,
            variables,
        });
    }
    Ok(rows)
}

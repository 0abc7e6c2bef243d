use std::{
    collections::{btree_map::Entry, BTreeMap, BTreeSet, HashMap},
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr as _,
};

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::schema::{FieldType, FormSchema, OperationType};
use crate::beancount::{format_file, BeancountFile};
use crate::format::write_atomically;
use crate::paths::{is_within, normalize_path};
use crate::template::{render, Variables};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub operation_type: OperationType,
    /// Absolute path below the beancount dir
    pub file: PathBuf,
    pub content: String,
}

/// Validates the submitted values and renders every operation of the form.
///
/// On failure all problems with the submission are returned.
pub fn process_form(
    schema: &FormSchema,
    form_data: &HashMap<String, String>,
    beancount_dir: &Path,
) -> Result<Vec<FileUpdate>, Vec<String>> {
    let mut errors = Vec::new();
    let mut variables = Variables::new();
    for field in &schema.fields {
        let value = form_data
            .get(&field.name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| field.default.clone())
            .unwrap_or_default();
        if value.is_empty() {
            if field.required {
                errors.push(format!("{} is required", field.label()));
            }
            variables.insert(field.name.clone(), value);
            continue;
        }
        let invalid = match field.field_type {
            FieldType::Number => Decimal::from_str(&value).is_err().then_some("number"),
            FieldType::Date => NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                .is_err()
                .then_some("date"),
            _ => None,
        };
        if let Some(expected) = invalid {
            errors.push(format!("{} is not a valid {expected}", field.label()));
        }
        variables.insert(field.name.clone(), value);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut updates = Vec::new();
    for operation in &schema.operations {
        let rendered = render(&operation.file, &variables)
            .and_then(|file| Ok((file, render(&operation.content, &variables)?)));
        let (file, content) = match rendered {
            Ok(rendered) => rendered,
            Err(err) => {
                errors.push(err.to_string());
                continue;
            }
        };
        let path = normalize_path(&beancount_dir.join(&file));
        if !is_within(beancount_dir, &path) {
            errors.push(format!("File {file} is outside of the beancount dir"));
            continue;
        }
        updates.push(FileUpdate {
            operation_type: operation.operation_type,
            file: path,
            content,
        });
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(updates)
}

/// Applies the updates and reformats every touched file.
///
/// All files are updated and parsed in memory first, nothing is written when
/// any of them fails to parse.
pub fn apply_updates(updates: &[FileUpdate]) -> Result<BTreeSet<PathBuf>> {
    let mut contents: BTreeMap<PathBuf, String> = BTreeMap::new();
    for update in updates {
        let content = match contents.entry(update.file.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(read_existing(&update.file)?),
        };
        match update.operation_type {
            OperationType::Append => content.push_str(&update.content),
        }
    }

    let formatted = contents
        .into_iter()
        .map(|(path, content)| -> Result<(PathBuf, String)> {
            let tree = BeancountFile::parse(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok((path, format_file(&tree)))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut updated_files = BTreeSet::new();
    for (path, content) in formatted {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomically(&path, content.as_bytes())?;
        log::info!("Updated file {}", console::style(path.display()).green());
        updated_files.insert(path);
    }
    Ok(updated_files)
}

fn read_existing(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
    }
}

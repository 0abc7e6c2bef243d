//! `bh import`: generate transactions from input files and reconcile them
//! with the ones already in the ledger

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _, Result};
use console::style;

mod changes;
mod config;
mod extract;
mod processor;

pub use changes::{
    apply_change_set, compute_changes, extract_imported_transactions, txn_to_text, ChangeSet,
    ImportedTransaction, IMPORT_ID_KEY,
};
pub use config::ImportDoc;
pub use processor::{process_imports, GeneratedTransaction, UnprocessedRow};

use crate::args::ImportArgs;
use crate::beancount::{format_file, traverse, BeancountFile, LoadedFile};
use crate::format::write_atomically;
use crate::paths::normalize_path;
use crate::terminal::table::{add_row, make_table, print_table};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub config: PathBuf,
    pub workdir: PathBuf,
    pub beanfile: PathBuf,
    pub remove_dangling: bool,
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub generated: usize,
    pub changed_files: Vec<PathBuf>,
    pub dangling: Vec<ImportedTransaction>,
    pub unprocessed: Vec<UnprocessedRow>,
}

pub fn main(args: &ImportArgs) -> Result<()> {
    let options = ImportOptions {
        config: absolute(&args.config)?,
        workdir: absolute(&args.workdir)?,
        beanfile: absolute(&args.beanfile)?,
        remove_dangling: args.remove_dangling,
    };
    let summary = run_import(&options)?;
    print_summary(&options.workdir, &summary, options.remove_dangling);
    log::info!("done");
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(normalize_path(&path))
}

pub fn run_import(options: &ImportOptions) -> Result<ImportSummary> {
    let doc = ImportDoc::load(&options.config)?;
    log::info!("Loaded import doc from {}", options.config.display());

    let processed = process_imports(&doc, &options.workdir)?;
    for txn in &processed.generated {
        log::debug!("Generated transaction {txn:?}");
    }
    log::info!(
        "Generated {} transactions",
        style(processed.generated.len()).green()
    );

    let files = traverse(&options.beanfile, &options.workdir)?;
    let imported = extract_imported_transactions(&files);
    log::info!(
        "Found {} existing imported transactions",
        style(imported.len()).green()
    );

    let mut loaded: HashMap<PathBuf, LoadedFile> = files
        .into_iter()
        .map(|file| (file.path.clone(), file))
        .collect();
    let change_sets = compute_changes(&processed.generated, &imported, &options.workdir);
    let mut summary = ImportSummary {
        generated: processed.generated.len(),
        unprocessed: processed.unprocessed,
        ..Default::default()
    };
    for (target_file, change_set) in change_sets {
        summary.dangling.extend(change_set.dangling.iter().cloned());
        let existing = match loaded.remove(&target_file) {
            Some(file) => Some(file),
            None if target_file.exists() => Some(LoadedFile::load(&target_file)?),
            None => None,
        };
        let (output, original) = match existing {
            None => {
                if !change_set.remove.is_empty() || !change_set.update.is_empty() {
                    bail!("Expect new transactions to add only");
                }
                log::info!(
                    "Create new bean file {} with {} transactions",
                    style(target_file.display()).green(),
                    change_set.add.len()
                );
                if let Some(parent) = target_file.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create directory {}", parent.display())
                    })?;
                }
                let tree = BeancountFile::parse(&changes::new_file_text(&change_set.add))?;
                (format_file(&tree), None)
            }
            Some(file) => {
                log::info!(
                    "Applying change sets (add={}, update={}, remove={}) to {}",
                    change_set.add.len(),
                    change_set.update.len(),
                    change_set.remove.len(),
                    style(target_file.display()).green()
                );
                let tree = apply_change_set(&file.tree, &change_set, options.remove_dangling)?;
                (format_file(&tree), Some(file.content))
            }
        };
        if original.as_deref() == Some(output.as_str()) {
            log::debug!("File {} is not changed", target_file.display());
            continue;
        }
        write_atomically(&target_file, output.as_bytes())?;
        summary.changed_files.push(target_file);
    }
    Ok(summary)
}

fn print_summary(workdir: &Path, summary: &ImportSummary, removed_dangling: bool) {
    if !summary.dangling.is_empty() {
        let mut table = make_table(["File", "Id"]);
        for txn in &summary.dangling {
            let file = txn.file.strip_prefix(workdir).unwrap_or(&txn.file);
            add_row(&mut table, [file.display().to_string(), txn.id.clone()]);
        }
        if removed_dangling {
            print_table("Removed dangling transactions", &table);
        } else {
            print_table("Dangling transactions", &table);
            log::info!("Run with --remove-dangling to remove them");
        }
    }
    if !summary.unprocessed.is_empty() {
        let mut table = make_table(["File", "Line"]);
        for row in &summary.unprocessed {
            add_row(&mut table, [row.file.clone(), row.lineno.to_string()]);
        }
        print_table("Unprocessed rows", &table);
    }
}

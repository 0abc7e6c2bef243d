use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
};

use anyhow::Result;

use super::processor::GeneratedTransaction;
use crate::beancount::{quote, BeancountFile, Entry, LoadedFile};
use crate::paths::normalize_path;

pub const IMPORT_ID_KEY: &str = "import-id";
pub const IMPORT_SRC_KEY: &str = "import-src";

/// A transaction in the ledger carrying an `import-id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTransaction {
    pub file: PathBuf,
    /// Index into the file's top level entries
    pub entry_index: usize,
    pub id: String,
}

#[derive(Debug, Default)]
pub struct ChangeSet {
    pub add: Vec<GeneratedTransaction>,
    /// Replacements keyed by entry index
    pub update: BTreeMap<usize, GeneratedTransaction>,
    pub remove: Vec<ImportedTransaction>,
    pub dangling: Vec<ImportedTransaction>,
}

pub fn extract_imported_transactions(files: &[LoadedFile]) -> Vec<ImportedTransaction> {
    let mut result = Vec::new();
    for file in files {
        for (entry_index, entry) in file.tree.entries.iter().enumerate() {
            let Entry::Directive(directive) = entry else {
                continue;
            };
            if !directive.is_transaction() {
                continue;
            }
            if let Some(id) = directive.metadata(IMPORT_ID_KEY) {
                result.push(ImportedTransaction {
                    file: file.path.clone(),
                    entry_index,
                    id,
                });
            }
        }
    }
    result
}

/// Diffs generated against already imported transactions, per target file.
///
/// A transaction whose target file changed is removed from the old file and
/// added to the new one. When an id was imported more than once, the first
/// occurrence is matched and the others are dangling.
pub fn compute_changes(
    generated: &[GeneratedTransaction],
    imported: &[ImportedTransaction],
    workdir: &Path,
) -> BTreeMap<PathBuf, ChangeSet> {
    let mut change_sets: BTreeMap<PathBuf, ChangeSet> = BTreeMap::new();
    let mut imported_by_id: HashMap<&str, &ImportedTransaction> = HashMap::new();
    for txn in imported {
        if imported_by_id.contains_key(txn.id.as_str()) {
            log::warn!(
                "Transaction {} was imported more than once, {} entry {} is dangling",
                txn.id,
                txn.file.display(),
                txn.entry_index
            );
            change_sets
                .entry(txn.file.clone())
                .or_default()
                .dangling
                .push(txn.clone());
        } else {
            imported_by_id.insert(&txn.id, txn);
        }
    }

    let mut generated_ids = HashSet::new();
    for txn in generated {
        if !generated_ids.insert(txn.id.as_str()) {
            log::warn!("Transaction {} was generated more than once, skipping", txn.id);
            continue;
        }
        let target = normalize_path(&workdir.join(&txn.file));
        match imported_by_id.get(txn.id.as_str()) {
            Some(existing) if existing.file == target => {
                change_sets
                    .entry(target)
                    .or_default()
                    .update
                    .insert(existing.entry_index, txn.clone());
            }
            Some(existing) => {
                change_sets
                    .entry(existing.file.clone())
                    .or_default()
                    .remove
                    .push((*existing).clone());
                change_sets.entry(target).or_default().add.push(txn.clone());
            }
            None => change_sets.entry(target).or_default().add.push(txn.clone()),
        }
    }

    for txn in imported_by_id.values() {
        if !generated_ids.contains(txn.id.as_str()) {
            change_sets
                .entry(txn.file.clone())
                .or_default()
                .dangling
                .push((*txn).clone());
        }
    }
    for change_set in change_sets.values_mut() {
        change_set.dangling.sort_by_key(|txn| txn.entry_index);
    }
    change_sets
}

pub fn txn_to_text(txn: &GeneratedTransaction) -> String {
    let mut header = vec![txn.date.format("%Y-%m-%d").to_string(), txn.flag.clone()];
    if let Some(payee) = &txn.payee {
        header.push(quote(payee));
    }
    header.push(quote(&txn.narration));

    let mut lines = vec![header.join(" ")];
    lines.push(format!("  {IMPORT_ID_KEY}: {}", quote(&txn.id)));
    if !txn.sources.is_empty() {
        lines.push(format!(
            "  {IMPORT_SRC_KEY}: {}",
            quote(&txn.sources.join(", "))
        ));
    }
    for posting in &txn.postings {
        match &posting.amount {
            Some(amount) => lines.push(format!(
                "  {} {} {}",
                posting.account, amount.number, amount.currency
            )),
            None => lines.push(format!("  {}", posting.account)),
        }
    }
    lines.join("\n")
}

fn txn_entries(txn: &GeneratedTransaction) -> Result<Vec<Entry>> {
    Ok(BeancountFile::parse(&txn_to_text(txn))?.entries)
}

pub fn apply_change_set(
    tree: &BeancountFile,
    change_set: &ChangeSet,
    remove_dangling: bool,
) -> Result<BeancountFile> {
    let mut removed: HashSet<usize> = change_set
        .remove
        .iter()
        .map(|txn| txn.entry_index)
        .collect();
    if remove_dangling {
        removed.extend(change_set.dangling.iter().map(|txn| txn.entry_index));
    }

    let mut entries = Vec::with_capacity(tree.entries.len() + change_set.add.len() * 2);
    for (index, entry) in tree.entries.iter().enumerate() {
        if removed.contains(&index) {
            continue;
        }
        match change_set.update.get(&index) {
            Some(txn) => entries.extend(txn_entries(txn)?),
            None => entries.push(entry.clone()),
        }
    }
    for txn in &change_set.add {
        entries.push(Entry::Blank);
        entries.extend(txn_entries(txn)?);
    }
    Ok(BeancountFile { entries })
}

/// Content of a bean file that does not exist yet
pub fn new_file_text(add: &[GeneratedTransaction]) -> String {
    add.iter().map(txn_to_text).collect::<Vec<_>>().join("\n\n")
}

#[cfg(test)]
pub(crate) mod testutils {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::import::processor::{Amount, GeneratedPosting, GeneratedTransaction};

    pub fn generated(id: &str, file: &str, narration: &str, number: i64) -> GeneratedTransaction {
        GeneratedTransaction {
            id: id.to_string(),
            sources: vec!["import-data/bank.csv".to_string()],
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            flag: "*".to_string(),
            payee: None,
            narration: narration.to_string(),
            file: file.to_string(),
            postings: vec![
                GeneratedPosting {
                    account: "Assets:Bank".to_string(),
                    amount: Some(Amount {
                        number: Decimal::new(number, 2),
                        currency: "USD".to_string(),
                    }),
                },
                GeneratedPosting {
                    account: "Expenses:Misc".to_string(),
                    amount: None,
                },
            ],
        }
    }
}

//! `bh format`: canonical formatting of ledger files with optional renames

use std::{
    io::{Read as _, Write as _},
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use console::style;
use tempfile::NamedTempFile;

use crate::args::FormatArgs;
use crate::beancount::{
    apply_transforms, format_file, traverse, BeancountFile, LoadedFile, RenameAccount,
    RenameCurrency, TokenTransform,
};

pub const MAIN_BEAN_FILE: &str = "main.bean";

pub fn main(args: &FormatArgs) -> Result<()> {
    let transforms = transforms_from_pairs(&args.rename_account, &args.rename_currency);
    if args.stdin_mode {
        log::info!("Processing in stdin mode");
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read stdin")?;
        let output = format_text(&input, &transforms)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(output.as_bytes())?;
        stdout.flush()?;
    } else {
        let workdir = std::env::current_dir().context("Failed to get current directory")?;
        let options = FormatOptions {
            files: args.files.clone(),
            backup: args.backup.then(|| args.backup_suffix.clone()),
            transforms,
        };
        run_format(&workdir, &options)?;
    }
    log::info!("done");
    Ok(())
}

pub struct FormatOptions {
    pub files: Vec<PathBuf>,
    /// Backup suffix, no backups when `None`
    pub backup: Option<String>,
    pub transforms: Vec<Box<dyn TokenTransform>>,
}

/// Clap hands us the `FROM TO` pairs flattened
pub fn transforms_from_pairs(
    rename_account: &[String],
    rename_currency: &[String],
) -> Vec<Box<dyn TokenTransform>> {
    let mut transforms: Vec<Box<dyn TokenTransform>> = Vec::new();
    for pair in rename_account.chunks_exact(2) {
        log::info!(
            "Renaming account from {} to {}",
            style(&pair[0]).green(),
            style(&pair[1]).green()
        );
        transforms.push(Box::new(RenameAccount {
            from: pair[0].clone(),
            to: pair[1].clone(),
        }));
    }
    for pair in rename_currency.chunks_exact(2) {
        log::info!(
            "Renaming currency from {} to {}",
            style(&pair[0]).green(),
            style(&pair[1]).green()
        );
        transforms.push(Box::new(RenameCurrency {
            from: pair[0].clone(),
            to: pair[1].clone(),
        }));
    }
    transforms
}

pub fn format_text(text: &str, transforms: &[Box<dyn TokenTransform>]) -> Result<String> {
    let mut tree = BeancountFile::parse(text)?;
    apply_transforms(&mut tree, transforms);
    Ok(format_file(&tree))
}

/// Formats the given files, or every file reachable from `main.bean` in
/// `workdir`. Returns the files that were rewritten.
pub fn run_format(workdir: &Path, options: &FormatOptions) -> Result<Vec<PathBuf>> {
    let files = if options.files.is_empty() {
        log::info!("No files provided, traverse starting from {MAIN_BEAN_FILE}");
        traverse(&workdir.join(MAIN_BEAN_FILE), workdir)?
    } else {
        options
            .files
            .iter()
            .map(|path| LoadedFile::load(&workdir.join(path)))
            .collect::<Result<_>>()?
    };

    let mut changed = Vec::new();
    for LoadedFile {
        path,
        content,
        mut tree,
    } in files
    {
        log::info!("Processing file {}", style(path.display()).green());
        if !options.transforms.is_empty() {
            let replaced = apply_transforms(&mut tree, &options.transforms);
            log::debug!("Replaced {replaced} tokens in {}", path.display());
        }
        let output = format_file(&tree);
        if output == content {
            log::info!("File {} is not changed, skip", path.display());
            continue;
        }
        if let Some(suffix) = &options.backup {
            let backup_path = create_backup(&path, suffix)?;
            log::info!(
                "File {} changed, backup to {}",
                path.display(),
                style(backup_path.display()).green()
            );
        }
        write_atomically(&path, output.as_bytes())?;
        changed.push(path);
    }
    Ok(changed)
}

/// Copies `path` to `<name><suffix>`, or `<name><suffix>.N` if that is taken
pub fn create_backup(path: &Path, suffix: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?
        .to_string_lossy();
    let mut backup_path = path.with_file_name(format!("{name}{suffix}"));
    let mut conflicts = 0;
    while backup_path.exists() {
        conflicts += 1;
        backup_path = path.with_file_name(format!("{name}{suffix}.{conflicts}"));
    }
    std::fs::copy(path, &backup_path).with_context(|| {
        format!(
            "Failed to back up {} to {}",
            path.display(),
            backup_path.display()
        )
    })?;
    Ok(backup_path)
}

/// Writes through a temp file in the same directory and keeps the permissions
pub fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    temp_file.write_all(content)?;
    if let Ok(metadata) = std::fs::metadata(path) {
        std::fs::set_permissions(temp_file.path(), metadata.permissions())?;
    }
    temp_file
        .persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

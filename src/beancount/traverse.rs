use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _, Result};

use super::parser::BeancountFile;
use crate::glob::{find_files, has_magic};
use crate::paths::{is_within, normalize_path};

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub content: String,
    pub tree: BeancountFile,
}

impl LoadedFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let tree = BeancountFile::parse(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            content,
            tree,
        })
    }
}

/// Loads `bean_file` and everything it includes, depth first.
///
/// Includes are resolved relative to the including file. Targets outside of
/// `root_dir` are skipped with a warning, each file is visited once.
pub fn traverse(bean_file: &Path, root_dir: &Path) -> Result<Vec<LoadedFile>> {
    let root_dir = normalize_path(root_dir);
    let mut visited = HashSet::new();
    let mut result = Vec::new();
    let mut pending = vec![normalize_path(bean_file)];
    while let Some(path) = pending.pop() {
        if !visited.insert(path.clone()) {
            continue;
        }
        let file = LoadedFile::load(&path)?;
        let base_dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
        let mut targets = Vec::new();
        for include in file.tree.includes() {
            for target in resolve_include(&base_dir, &include)? {
                if is_within(&root_dir, &target) {
                    targets.push(target);
                } else {
                    log::warn!(
                        "Skipping include {} of {}, it is outside of {}",
                        target.display(),
                        path.display(),
                        root_dir.display()
                    );
                }
            }
        }
        pending.extend(targets.into_iter().rev());
        result.push(file);
    }
    Ok(result)
}

fn resolve_include(base_dir: &Path, include: &str) -> Result<Vec<PathBuf>> {
    if !has_magic(include) {
        let target = normalize_path(&base_dir.join(include));
        if !target.is_file() {
            bail!("Included file {} does not exist", target.display());
        }
        return Ok(vec![target]);
    }
    if Path::new(include).is_absolute() {
        bail!("Absolute include patterns are not supported: {include}");
    }
    Ok(find_files(base_dir, include)?
        .iter()
        .map(|path| normalize_path(path))
        .collect())
}

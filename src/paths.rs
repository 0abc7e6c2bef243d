use std::path::{Component, Path, PathBuf};

/// Lexically resolves `.` and `..` components without touching the filesystem.
/// Leading `..` components that cannot be resolved are kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// Whether `path` stays inside `root` after lexical normalization
pub fn is_within(root: &Path, path: &Path) -> bool {
    let root = normalize_path(root);
    let path = normalize_path(path);
    path.starts_with(&root)
        && !path
            .components()
            .skip(root.components().count())
            .any(|component| component == Component::ParentDir)
}

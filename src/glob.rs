//! Glob patterns relative to a directory, e.g. `import-data/**/*.csv`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use regex::Regex;
use walkdir::WalkDir;

pub fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '[' {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if !closed {
                    bail!("Unclosed character class in glob pattern {pattern:?}");
                }
                regex.push('[');
                regex.push_str(&class);
                regex.push(']');
            }
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).with_context(|| format!("Invalid glob pattern {pattern:?}"))
}

/// Path relative to `root` with `/` separators, as globs are matched against
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

/// Files below `root` matching `pattern`, sorted
pub fn find_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let regex = glob_to_regex(pattern.trim_start_matches("./"))?;
    let mut result = Vec::new();
    if !root.is_dir() {
        return Ok(result);
    }
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = relative_slash_path(root, entry.path()) else {
            continue;
        };
        if regex.is_match(&relative) {
            result.push(entry.into_path());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("*.csv", "chase.csv", true)]
    #[case("*.csv", "connect/chase.csv", false)]
    #[case("import-data/connect/*.csv", "import-data/connect/chase.csv", true)]
    #[case("import-data/**/*.csv", "import-data/chase.csv", true)]
    #[case("import-data/**/*.csv", "import-data/a/b/chase.csv", true)]
    #[case("**", "a/b/c", true)]
    #[case("file?.bean", "file1.bean", true)]
    #[case("file?.bean", "file10.bean", false)]
    #[case("[ab].bean", "a.bean", true)]
    #[case("[!ab].bean", "a.bean", false)]
    #[case("a+b.bean", "a+b.bean", true)]
    #[case("a+b.bean", "aab.bean", false)]
    fn matching(#[case] pattern: &str, #[case] path: &str, #[case] expected: bool) {
        assert_eq!(expected, glob_to_regex(pattern).unwrap().is_match(path));
    }

    #[test]
    fn unclosed_class() {
        assert!(glob_to_regex("[ab.bean").is_err());
    }

    #[test]
    fn find_files_sorted() {
        let tempdir = tempfile::tempdir().unwrap();
        let root = tempdir.path();
        std::fs::create_dir_all(root.join("books/2024")).unwrap();
        for file in ["books/b.bean", "books/a.bean", "books/2024/c.bean", "books/notes.txt"] {
            std::fs::write(root.join(file), "").unwrap();
        }
        assert_eq!(
            vec![root.join("books/a.bean"), root.join("books/b.bean")],
            find_files(root, "books/*.bean").unwrap()
        );
        assert_eq!(
            vec![
                root.join("books/2024/c.bean"),
                root.join("books/a.bean"),
                root.join("books/b.bean")
            ],
            find_files(root, "./books/**/*.bean").unwrap()
        );
    }

    #[test]
    fn missing_root() {
        let tempdir = tempfile::tempdir().unwrap();
        assert!(find_files(&tempdir.path().join("missing"), "*")
            .unwrap()
            .is_empty());
    }
}

//! Collecting upload files from a directory for `promo import-batch --dir`.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_INCLUDE_GLOBS: &[&str] = &["**/*.csv", "**/*.tsv"];

const DEFAULT_EXCLUDE_GLOBS: &[&str] = &["**/.git/**", "**/.*", "**/.*/**"];

/// Files under `root` matching any include glob, sorted by relative path.
pub fn discover_files(root: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Import directory does not exist: {}", root.display());
    }

    let include_set = if include_globs.is_empty() {
        let defaults: Vec<String> = DEFAULT_INCLUDE_GLOBS.iter().map(|s| s.to_string()).collect();
        build_globset(&defaults)?
    } else {
        build_globset(include_globs)?
    };
    let excludes: Vec<String> = DEFAULT_EXCLUDE_GLOBS.iter().map(|s| s.to_string()).collect();
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().map(|(_, p)| p).collect())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_csv_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("march")).unwrap();
        std::fs::create_dir_all(dir.path().join(".cache")).unwrap();
        std::fs::write(dir.path().join("b.csv"), "x").unwrap();
        std::fs::write(dir.path().join("a.tsv"), "x").unwrap();
        std::fs::write(dir.path().join("march/c.csv"), "x").unwrap();
        std::fs::write(dir.path().join("notes.md"), "x").unwrap();
        std::fs::write(dir.path().join(".cache/d.csv"), "x").unwrap();

        let found = discover_files(dir.path(), &[]).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(names, vec!["a.tsv", "b.csv", "march/c.csv"]);
    }

    #[test]
    fn custom_globs_and_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("export.txt"), "x").unwrap();
        std::fs::write(dir.path().join("b.csv"), "x").unwrap();
        let found = discover_files(dir.path(), &["*.txt".to_string()]).unwrap();
        assert_eq!(found.len(), 1);

        assert!(discover_files(&dir.path().join("nope"), &[]).is_err());
    }
}

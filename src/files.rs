//! Disk I/O for the command line. The engine itself only sees `SourceFile`s.

use crate::source::SourceFile;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, PartialEq, Eq)]
pub struct ExpansionResult {
    pub files: Vec<String>,
    pub not_found: Vec<String>,
}

/// Expands `paths` into a sorted, de-duplicated file list. Files given
/// explicitly are always kept; directories are walked honoring `.gitignore`
/// and only yield files with one of `extensions`.
pub fn expand_paths(paths: &[String], extensions: &[String]) -> ExpansionResult {
    let mut files = BTreeSet::new();
    let mut not_found = Vec::new();

    for path_str in paths {
        let path = Path::new(path_str);
        if path.is_dir() {
            expand_directory(path, extensions, &mut files);
        } else if path.is_file() {
            files.insert(path.to_string_lossy().into_owned());
        } else {
            not_found.push(path_str.clone());
        }
    }

    ExpansionResult {
        files: files.into_iter().collect(),
        not_found,
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x == e))
}

fn expand_directory(dir_path: &Path, extensions: &[String], files: &mut BTreeSet<String>) {
    let walker = WalkBuilder::new(dir_path)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .build();
    for entry in walker.filter_map(Result::ok) {
        let is_file = entry.file_type().is_some_and(|t| t.is_file());
        if is_file && has_extension(entry.path(), extensions) {
            files.insert(entry.path().to_string_lossy().into_owned());
        }
    }
}

pub fn read_source_files(paths: &[String]) -> Result<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| {
            let content =
                fs::read_to_string(path).with_context(|| format!("failed to read '{path}'"))?;
            Ok(SourceFile::new(path.clone(), content))
        })
        .collect()
}

/// Reads the files named by `paths` relative to `root`. Paths that do not
/// exist are skipped so edits may create them.
pub fn read_existing_under(root: &Path, paths: &[String]) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for path in paths {
        let full = root.join(path);
        if full.is_file() {
            let content = fs::read_to_string(&full)
                .with_context(|| format!("failed to read '{}'", full.display()))?;
            files.push(SourceFile::new(path.clone(), content));
        }
    }
    Ok(files)
}

/// Writes each file to `root`/`file.path`, creating parent directories.
pub fn write_source_files(root: &Path, files: &[SourceFile]) -> Result<()> {
    for file in files {
        let full = root.join(&file.path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, &file.content)
            .with_context(|| format!("failed to write '{}'", full.display()))?;
        debug!(path = %full.display(), "wrote file");
    }
    Ok(())
}

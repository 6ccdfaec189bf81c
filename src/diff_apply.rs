//! # Diff Applicator
//!
//! Applies search/replace edit blocks to a set of files. Blocks for one file
//! run in the order given, each against the previous block's output. A block
//! that cannot be located uniquely abandons its file; other files proceed.
//!
//! Matching is exact first. If the search text does not occur verbatim, a
//! line-window match that ignores whitespace differences and line endings is
//! tried, and the file's own line endings are kept in the replacement.

use crate::analyzer::{AnalyzerThresholds, FileAnalysis, analyze};
use crate::error::{EngineError, EngineResult};
use crate::source::SourceFile;
use crate::syntax::SyntaxTree;
use crate::validation::{ValidationSettings, check_balance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, info, warn};

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER_MARKER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditBlock {
    pub file_path: String,
    pub search_text: String,
    pub replace_text: String,
}

impl EditBlock {
    pub fn new(
        file_path: impl Into<String>,
        search_text: impl Into<String>,
        replace_text: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            search_text: search_text.into(),
            replace_text: replace_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffApplication {
    pub modified_files: Vec<SourceFile>,
    pub errors: Vec<String>,
    /// Advisory only; never affects success.
    pub extraction_suggestions: Vec<FileAnalysis>,
}

impl DiffApplication {
    /// True when every entry in `errors` is an informational note.
    pub fn is_clean(&self) -> bool {
        self.errors.iter().all(|e| e.starts_with("note:"))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiffSettings {
    pub validation: ValidationSettings,
    pub analyzer: AnalyzerThresholds,
}

/// Strips decoration models put around a path line: fences, bullets, bold,
/// backticks and a trailing colon.
fn clean_path_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("```") {
        return None;
    }
    let path = line
        .trim_start_matches(['-', '*', '#', ' '])
        .trim_matches(['`', '*', ' '])
        .trim_end_matches(':')
        .trim();
    (!path.is_empty()).then(|| path.to_string())
}

/// Extracts edit blocks from text in the form:
///
/// ```text
/// src/App.tsx
/// <<<<<<< SEARCH
/// old lines
/// =======
/// new lines
/// >>>>>>> REPLACE
/// ```
pub fn parse_edit_blocks(text: &str) -> EngineResult<Vec<EditBlock>> {
    enum Section {
        Outside,
        Search,
        Replace,
    }

    let mut blocks = Vec::new();
    let mut section = Section::Outside;
    let mut path: Option<String> = None;
    let mut current_path = String::new();
    let mut search: Vec<&str> = Vec::new();
    let mut replace: Vec<&str> = Vec::new();

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        match section {
            Section::Outside => {
                if line.trim() == SEARCH_MARKER {
                    current_path = path.clone().ok_or_else(|| {
                        EngineError::MalformedOperation(format!(
                            "edit block at line {} has no file path",
                            number + 1
                        ))
                    })?;
                    section = Section::Search;
                } else if let Some(p) = clean_path_line(line) {
                    path = Some(p);
                }
            }
            Section::Search => {
                if line.trim() == DIVIDER_MARKER {
                    section = Section::Replace;
                } else {
                    search.push(line);
                }
            }
            Section::Replace => {
                if line.trim() == REPLACE_MARKER {
                    blocks.push(EditBlock::new(
                        current_path.clone(),
                        search.join("\n"),
                        replace.join("\n"),
                    ));
                    search.clear();
                    replace.clear();
                    section = Section::Outside;
                } else {
                    replace.push(line);
                }
            }
        }
    }

    if !matches!(section, Section::Outside) {
        return Err(EngineError::MalformedOperation(format!(
            "unterminated edit block for '{current_path}'"
        )));
    }
    Ok(blocks)
}

/// Applies edit blocks with default settings.
pub fn apply_diff(files: &[SourceFile], diffs: &[EditBlock]) -> DiffApplication {
    apply_diff_with(files, diffs, &DiffSettings::default())
}

pub fn apply_diff_with(
    files: &[SourceFile],
    diffs: &[EditBlock],
    settings: &DiffSettings,
) -> DiffApplication {
    let originals: BTreeMap<&str, &str> = files
        .iter()
        .map(|f| (f.path.as_str(), f.content.as_str()))
        .collect();

    // Group by path, keeping the order in which paths first appear.
    let mut groups: Vec<(&str, Vec<&EditBlock>)> = Vec::new();
    for block in diffs {
        match groups.iter_mut().find(|(path, _)| *path == block.file_path) {
            Some((_, blocks)) => blocks.push(block),
            None => groups.push((block.file_path.as_str(), vec![block])),
        }
    }

    let mut modified_files = Vec::new();
    let mut errors = Vec::new();

    for (path, blocks) in groups {
        let original = originals.get(path).copied();
        match apply_file_blocks(path, original, &blocks) {
            Ok(content) => {
                if original == Some(content.as_str()) {
                    debug!(file = path, "edit blocks left file unchanged");
                    errors.push(format!("note: '{path}' is unchanged after applying its edit blocks"));
                    continue;
                }
                if let Some(warning) = post_check(&content, &settings.validation) {
                    warn!(file = path, warning = %warning, "edited file failed the syntax check");
                    errors.push(format!("warning: '{path}' may be malformed after editing: {warning}"));
                }
                modified_files.push(SourceFile::new(path, content));
            }
            Err(e) => {
                warn!(file = path, error = %e, "abandoning edits for file");
                errors.push(format!("{e} [{}]", e.kind()));
            }
        }
    }

    let extraction_suggestions = modified_files
        .iter()
        .map(|f| analyze(f, &settings.analyzer))
        .filter(|a| a.needs_extraction)
        .collect();

    info!(
        modified = modified_files.len(),
        errors = errors.len(),
        "applied edit blocks"
    );
    DiffApplication {
        modified_files,
        errors,
        extraction_suggestions,
    }
}

fn apply_file_blocks(path: &str, original: Option<&str>, blocks: &[&EditBlock]) -> EngineResult<String> {
    let mut content = match original {
        Some(content) => content.to_string(),
        None if blocks.first().is_some_and(|b| b.search_text.trim().is_empty()) => String::new(),
        None => {
            return Err(EngineError::TargetNotFound(format!(
                "'{path}' is not among the provided files"
            )));
        }
    };
    for (i, block) in blocks.iter().enumerate() {
        content = apply_block(&content, block, path, i + 1)?;
    }
    Ok(content)
}

fn apply_block(content: &str, block: &EditBlock, path: &str, number: usize) -> EngineResult<String> {
    let not_found = || EngineError::SearchNotFound {
        file: path.to_string(),
        block: number,
    };
    let ambiguous = |occurrences| EngineError::AmbiguousMatch {
        file: path.to_string(),
        block: number,
        occurrences,
    };

    if block.search_text.trim().is_empty() {
        return if content.trim().is_empty() {
            Ok(block.replace_text.clone())
        } else {
            Err(not_found())
        };
    }

    match exact_matches(content, &block.search_text).as_slice() {
        [start] => {
            debug!(file = path, block = number, "exact match");
            let mut out = content.to_string();
            out.replace_range(*start..start + block.search_text.len(), &block.replace_text);
            return Ok(out);
        }
        [] => {}
        many => return Err(ambiguous(many.len())),
    }

    let windows = normalized_matches(content, &block.search_text);
    match windows.as_slice() {
        [range] => {
            debug!(file = path, block = number, "normalized match");
            let replacement = if content.contains("\r\n") {
                block.replace_text.replace("\r\n", "\n").replace('\n', "\r\n")
            } else {
                block.replace_text.replace("\r\n", "\n")
            };
            let replacement = replacement.trim_end_matches(['\r', '\n']);
            let mut out = content.to_string();
            out.replace_range(range.clone(), replacement);
            Ok(out)
        }
        [] => Err(not_found()),
        many => Err(ambiguous(many.len())),
    }
}

/// Start offsets of every occurrence of `needle`, overlapping ones included.
fn exact_matches(content: &str, needle: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(i) = content[from..].find(needle) {
        let start = from + i;
        starts.push(start);
        from = start + content[start..].chars().next().map_or(1, char::len_utf8);
    }
    starts
}

fn normalize_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte ranges of every line window whose whitespace-normalized lines equal
/// the search lines. Ranges cover the lines without their final terminator.
fn normalized_matches(content: &str, search: &str) -> Vec<Range<usize>> {
    let needle: Vec<String> = search
        .lines()
        .map(normalize_line)
        .skip_while(|l| l.is_empty())
        .collect();
    let needle_len = needle.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
    let needle = &needle[..needle_len];
    if needle.is_empty() {
        return Vec::new();
    }

    let mut lines: Vec<(Range<usize>, String)> = Vec::new();
    let mut offset = 0;
    for raw in content.split_inclusive('\n') {
        let body = raw.trim_end_matches('\n').trim_end_matches('\r');
        lines.push((offset..offset + body.len(), normalize_line(body)));
        offset += raw.len();
    }

    if lines.len() < needle.len() {
        return Vec::new();
    }
    (0..=lines.len() - needle.len())
        .filter(|&start| {
            lines[start..start + needle.len()]
                .iter()
                .zip(needle)
                .all(|((_, line), want)| line == want)
        })
        .map(|start| lines[start].0.start..lines[start + needle.len() - 1].0.end)
        .collect()
}

fn post_check(content: &str, settings: &ValidationSettings) -> Option<String> {
    if let Err(e) = check_balance(content, settings) {
        return Some(e.to_string());
    }
    SyntaxTree::parse(content).err().map(|e| e.to_string())
}

//! # Structural Analyzer
//!
//! An advisory pass over finished files that suggests component or hook
//! extractions. It never edits anything and never fails: a file that cannot be
//! parsed is still measured with text heuristics.

use crate::markup::tag_name;
use crate::source::SourceFile;
use crate::syntax::{NodeId, SyntaxTree};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

static HOOK_CALL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:React\.)?use[A-Z]\w*\s*(?:<[^>()]*>)?\s*\(").expect("Invalid regex"));

static HOOK_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:React\.)?use[A-Z]\w*$").expect("Invalid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerThresholds {
    pub max_lines: usize,
    pub max_jsx_depth: usize,
    pub max_hook_declarations: usize,
    pub min_repeated_siblings: usize,
}

impl Default for AnalyzerThresholds {
    fn default() -> Self {
        Self {
            max_lines: 250,
            max_jsx_depth: 6,
            max_hook_declarations: 8,
            min_repeated_siblings: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    LargeFile,
    DeepNesting,
    ManyHooks,
    RepeatedMarkup,
}

/// 1-based, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSuggestion {
    pub kind: SuggestionKind,
    pub message: String,
    pub suggested_name: Option<String>,
    pub line_range: Option<LineRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub file_path: String,
    pub needs_extraction: bool,
    pub suggestions: Vec<ExtractionSuggestion>,
}

impl FileAnalysis {
    /// A human-readable summary of this file's suggestions, if it has any.
    pub fn extraction_message(&self) -> Option<String> {
        if !self.needs_extraction {
            return None;
        }
        let mut message = format!("{} could be split up:", self.file_path);
        for suggestion in &self.suggestions {
            message.push_str("\n  - ");
            message.push_str(&suggestion.message);
            if let Some(range) = suggestion.line_range {
                message.push_str(&format!(" (lines {}-{})", range.start, range.end));
            }
        }
        Some(message)
    }
}

/// Combines the messages of every analysis that needs extraction.
pub fn generate_extraction_message(analyses: &[FileAnalysis]) -> Option<String> {
    let messages: Vec<String> = analyses
        .iter()
        .filter_map(FileAnalysis::extraction_message)
        .collect();
    if messages.is_empty() {
        None
    } else {
        Some(format!(
            "Extraction suggestions (advisory, nothing was changed):\n{}",
            messages.join("\n")
        ))
    }
}

pub fn analyze(file: &SourceFile, thresholds: &AnalyzerThresholds) -> FileAnalysis {
    let mut suggestions = Vec::new();
    let content = file.content.as_str();
    if !content.trim().is_empty() {
        let lines = file.line_count();
        if lines > thresholds.max_lines {
            suggestions.push(ExtractionSuggestion {
                kind: SuggestionKind::LargeFile,
                message: format!(
                    "file has {lines} lines (threshold {}); consider moving subcomponents into their own files",
                    thresholds.max_lines
                ),
                suggested_name: None,
                line_range: None,
            });
        }

        match SyntaxTree::parse(content) {
            Ok(tree) => {
                suggestions.extend(hook_suggestion(
                    &file.path,
                    count_hook_calls(&tree),
                    thresholds,
                ));
                suggestions.extend(nesting_suggestions(&tree, thresholds));
                suggestions.extend(repeated_markup_suggestions(&tree, thresholds));
            }
            Err(e) => {
                debug!(file = %file.path, error = %e, "analyzing unparseable file by text");
                let hooks = HOOK_CALL_REGEX.find_iter(content).count();
                suggestions.extend(hook_suggestion(&file.path, hooks, thresholds));
            }
        }
    }

    debug!(file = %file.path, suggestions = suggestions.len(), "analyzed file");
    FileAnalysis {
        file_path: file.path.clone(),
        needs_extraction: !suggestions.is_empty(),
        suggestions,
    }
}

pub fn analyze_all(files: &[SourceFile], thresholds: &AnalyzerThresholds) -> Vec<FileAnalysis> {
    files.iter().map(|f| analyze(f, thresholds)).collect()
}

fn line_range(tree: &SyntaxTree, start: NodeId, end: NodeId) -> LineRange {
    let (start_line, _) = tree.line_col(tree.node(start).start);
    let (end_line, _) = tree.line_col(tree.node(end).end);
    LineRange {
        start: start_line + 1,
        end: end_line + 1,
    }
}

fn count_hook_calls(tree: &SyntaxTree) -> usize {
    tree.ids()
        .filter(|&id| tree.kind(id) == "call_expression")
        .filter_map(|id| tree.child_by_field(id, "function"))
        .filter(|&f| HOOK_NAME_REGEX.is_match(tree.text(f)))
        .count()
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Component")
        .to_string()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn hook_suggestion(
    path: &str,
    hooks: usize,
    thresholds: &AnalyzerThresholds,
) -> Option<ExtractionSuggestion> {
    if hooks <= thresholds.max_hook_declarations {
        return None;
    }
    let name = format!("use{}", capitalize(&file_stem(path)));
    Some(ExtractionSuggestion {
        kind: SuggestionKind::ManyHooks,
        message: format!(
            "{hooks} hook calls (threshold {}); consider moving related state and effects into a custom hook `{name}`",
            thresholds.max_hook_declarations
        ),
        suggested_name: Some(name),
        line_range: None,
    })
}

fn is_element(tree: &SyntaxTree, id: NodeId) -> bool {
    matches!(
        tree.kind(id),
        "jsx_element" | "jsx_self_closing_element"
    )
}

fn component_name_for(tag: &str) -> String {
    match tag {
        "li" => "ListItem".to_string(),
        "ul" | "ol" => "List".to_string(),
        "tr" => "TableRow".to_string(),
        "td" | "th" => "TableCell".to_string(),
        "p" => "Paragraph".to_string(),
        "a" => "Link".to_string(),
        tag if tag.starts_with(|c: char| c.is_ascii_uppercase()) => format!("{tag}Item"),
        tag => format!("{}Content", capitalize(tag)),
    }
}

fn element_depth(tree: &SyntaxTree, id: NodeId) -> usize {
    1 + tree.ancestors(id).filter(|&a| is_element(tree, a)).count()
}

/// Suggests extracting the subtree rooted at the deepest allowed level above
/// each over-nested element.
fn nesting_suggestions(tree: &SyntaxTree, thresholds: &AnalyzerThresholds) -> Vec<ExtractionSuggestion> {
    let limit = thresholds.max_jsx_depth.max(1);
    let mut roots: Vec<NodeId> = Vec::new();
    let mut deepest: BTreeMap<NodeId, usize> = BTreeMap::new();

    for id in tree.ids().filter(|&id| is_element(tree, id)) {
        let depth = element_depth(tree, id);
        if depth <= limit {
            continue;
        }
        let root = tree
            .ancestors(id)
            .filter(|&a| is_element(tree, a))
            .find(|&a| element_depth(tree, a) == limit)
            .unwrap_or(id);
        if !roots.contains(&root) {
            roots.push(root);
        }
        let entry = deepest.entry(root).or_default();
        *entry = (*entry).max(depth);
    }

    roots
        .into_iter()
        .map(|root| {
            let tag = tag_name(tree, root).unwrap_or("fragment");
            let name = component_name_for(tag);
            ExtractionSuggestion {
                kind: SuggestionKind::DeepNesting,
                message: format!(
                    "markup under <{tag}> nests {} levels deep (threshold {limit}); consider extracting it into `{name}`",
                    deepest.get(&root).copied().unwrap_or(limit)
                ),
                suggested_name: Some(name),
                line_range: Some(line_range(tree, root, root)),
            }
        })
        .collect()
}

/// The tag plus sorted attribute names; siblings with equal shapes are
/// candidates for a list component.
fn element_shape(tree: &SyntaxTree, id: NodeId) -> Option<(String, Vec<String>)> {
    let tag = tag_name(tree, id)?.to_string();
    let opening = if tree.kind(id) == "jsx_self_closing_element" {
        id
    } else {
        tree.child_by_field(id, "open_tag")?
    };
    let mut attributes: Vec<String> = tree
        .named_children(opening)
        .filter(|&c| tree.kind(c) == "jsx_attribute")
        .filter_map(|a| tree.children(a).first().map(|&n| tree.text(n).to_string()))
        .collect();
    attributes.sort();
    Some((tag, attributes))
}

fn repeated_markup_suggestions(
    tree: &SyntaxTree,
    thresholds: &AnalyzerThresholds,
) -> Vec<ExtractionSuggestion> {
    let min = thresholds.min_repeated_siblings.max(2);
    let mut suggestions = Vec::new();

    for parent in tree.ids().filter(|&id| tree.kind(id) == "jsx_element") {
        let mut groups: BTreeMap<(String, Vec<String>), Vec<NodeId>> = BTreeMap::new();
        for child in tree.named_children(parent).filter(|&c| is_element(tree, c)) {
            if let Some(shape) = element_shape(tree, child) {
                groups.entry(shape).or_default().push(child);
            }
        }
        for ((tag, _), members) in groups {
            if members.len() < min {
                continue;
            }
            let (Some(&first), Some(&last)) = (members.first(), members.last()) else {
                continue;
            };
            let name = component_name_for(&tag);
            suggestions.push(ExtractionSuggestion {
                kind: SuggestionKind::RepeatedMarkup,
                message: format!(
                    "{} sibling <{tag}> elements share the same shape; consider a `{name}` component rendered from an array with .map()",
                    members.len()
                ),
                suggested_name: Some(name),
                line_range: Some(line_range(tree, first, last)),
            });
        }
    }
    suggestions
}

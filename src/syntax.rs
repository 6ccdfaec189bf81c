//! # Syntax Tree Accessor
//!
//! Parses component source text into an owned, read-only node table and
//! serializes it back. The table is built once per parse by walking the
//! tree-sitter TSX tree in document order; every node is addressed by a
//! [`NodeId`] (its index in that order), so selectors and editors never hold
//! borrowed tree-sitter nodes or rely on reference identity.
//!
//! Mutation never happens in place. Editors describe their change as a set of
//! [`Splice`]s over the source text and call [`SyntaxTree::apply_splices`],
//! which re-parses the result and refuses to return a tree that contains
//! syntax errors.

use crate::error::{EngineError, EngineResult};
use std::ops::Range;
use tree_sitter::Parser;

/// Index of a node in the document-order node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub kind: &'static str,
    /// The grammar field under which this node hangs off its parent, if any.
    pub field: Option<&'static str>,
    pub start: usize,
    pub end: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub named: bool,
    pub depth: usize,
    /// True for `ERROR` nodes and for tokens the parser had to invent.
    pub is_error: bool,
    pub is_missing: bool,
}

/// A replacement of a byte range of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Splice {
    pub range: Range<usize>,
    pub text: String,
}

impl Splice {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            range: at..at,
            text: text.into(),
        }
    }

    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self {
            range,
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxTree {
    source: String,
    nodes: Vec<NodeRecord>,
}

impl SyntaxTree {
    /// Parses `text` with the TSX grammar.
    ///
    /// Parsing never partially succeeds: any `ERROR` or missing node fails the
    /// whole parse with [`EngineError::Parse`].
    pub fn parse(text: &str) -> EngineResult<Self> {
        let language: tree_sitter::Language = tree_sitter_typescript::LANGUAGE_TSX.into();
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| EngineError::Parse(format!("failed to load TSX grammar: {e}")))?;

        let tree = parser
            .parse(text, None)
            .ok_or_else(|| EngineError::Parse("parser produced no tree".to_string()))?;

        let syntax_tree = Self {
            source: text.to_string(),
            nodes: build_node_table(&tree),
        };

        if tree.root_node().has_error() {
            return Err(EngineError::Parse(syntax_tree.describe_first_error()));
        }
        Ok(syntax_tree)
    }

    pub fn serialize(&self) -> String {
        self.source.clone()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &NodeRecord {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &'static str {
        self.nodes[id.0].kind
    }

    pub fn text(&self, id: NodeId) -> &str {
        let node = &self.nodes[id.0];
        &self.source[node.start..node.end]
    }

    pub fn range(&self, id: NodeId) -> Range<usize> {
        let node = &self.nodes[id.0];
        node.start..node.end
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn named_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|c| self.nodes[c.0].named)
    }

    pub fn child_by_field(&self, id: NodeId, field: &str) -> Option<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].field == Some(field))
    }

    pub fn children_by_field<'a>(
        &'a self,
        id: NodeId,
        field: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |c| self.nodes[c.0].field == Some(field))
    }

    /// Every node in document (pre-)order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// The strict descendants of `id`, in document order.
    ///
    /// Pre-order numbering keeps a subtree contiguous in the table, so this is
    /// the run of nodes after `id` that sit deeper than it.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let depth = self.nodes[id.0].depth;
        (id.0 + 1..self.nodes.len())
            .take_while(move |&i| self.nodes[i].depth > depth)
            .map(NodeId)
    }

    pub fn find_first(&self, within: NodeId, kind: &str) -> Option<NodeId> {
        self.descendants(within).find(|&d| self.kind(d) == kind)
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Zero-based line and column of a byte offset.
    pub fn line_col(&self, byte: usize) -> (usize, usize) {
        let before = &self.source[..byte.min(self.source.len())];
        let line = before.matches('\n').count();
        let col = before.len() - before.rfind('\n').map_or(0, |i| i + 1);
        (line, col)
    }

    /// Applies non-overlapping splices and re-parses the result.
    pub fn apply_splices(&self, mut splices: Vec<Splice>) -> EngineResult<SyntaxTree> {
        splices.sort_by(|a, b| {
            b.range
                .start
                .cmp(&a.range.start)
                .then(b.range.end.cmp(&a.range.end))
        });
        for pair in splices.windows(2) {
            if pair[1].range.end > pair[0].range.start {
                return Err(EngineError::MalformedOperation(
                    "overlapping edits within one operation".to_string(),
                ));
            }
        }

        let mut text = self.source.clone();
        for splice in splices {
            text.replace_range(splice.range, &splice.text);
        }
        SyntaxTree::parse(&text)
    }

    fn describe_first_error(&self) -> String {
        let Some(record) = self.nodes.iter().find(|n| n.is_error || n.is_missing) else {
            return "syntax error".to_string();
        };
        let (line, col) = self.line_col(record.start);
        if record.is_missing {
            format!("missing `{}` at line {}, column {}", record.kind, line + 1, col + 1)
        } else {
            let snippet: String = self.source[record.start..record.end]
                .chars()
                .take(40)
                .collect();
            format!(
                "unexpected `{}` at line {}, column {}",
                snippet.trim(),
                line + 1,
                col + 1
            )
        }
    }
}

fn build_node_table(tree: &tree_sitter::Tree) -> Vec<NodeRecord> {
    let mut nodes: Vec<NodeRecord> = Vec::new();
    let mut parents: Vec<NodeId> = Vec::new();
    let mut cursor = tree.walk();

    loop {
        let node = cursor.node();
        let id = NodeId(nodes.len());
        let parent = parents.last().copied();
        nodes.push(NodeRecord {
            kind: node.kind(),
            field: cursor.field_name(),
            start: node.start_byte(),
            end: node.end_byte(),
            parent,
            children: Vec::new(),
            named: node.is_named(),
            depth: parents.len(),
            is_error: node.is_error(),
            is_missing: node.is_missing(),
        });
        if let Some(p) = parent {
            nodes[p.0].children.push(id);
        }

        if cursor.goto_first_child() {
            parents.push(id);
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return nodes;
            }
            parents.pop();
        }
    }
}

// --- Text layout helpers shared by the editors ---

pub(crate) fn line_start(source: &str, byte: usize) -> usize {
    source[..byte].rfind('\n').map_or(0, |i| i + 1)
}

/// The offset of the newline that ends the line containing `byte`, or the end
/// of the text.
pub(crate) fn line_end(source: &str, byte: usize) -> usize {
    source[byte..].find('\n').map_or(source.len(), |i| byte + i)
}

/// The leading whitespace of the line containing `byte`.
pub(crate) fn line_indent(source: &str, byte: usize) -> &str {
    let start = line_start(source, byte);
    let line = &source[start..line_end(source, start)];
    let trimmed = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - trimmed.len()]
}

/// True when only whitespace sits between the start of the line and `byte`.
pub(crate) fn starts_own_line(source: &str, byte: usize) -> bool {
    source[line_start(source, byte)..byte]
        .chars()
        .all(|c| c == ' ' || c == '\t')
}

/// True when only whitespace sits between `byte` and the end of its line.
pub(crate) fn ends_own_line(source: &str, byte: usize) -> bool {
    source[byte..line_end(source, byte)].trim().is_empty()
}

/// Re-indents every line after the first with `indent`.
pub(crate) fn indent_continuation(text: &str, indent: &str) -> String {
    let mut lines = text.lines();
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        if !line.trim().is_empty() {
            out.push_str(indent);
        }
        out.push_str(line);
    }
    out
}

/// The indentation unit the file uses, guessed from its first indented line.
pub(crate) fn indent_unit(source: &str) -> &'static str {
    for line in source.lines() {
        if line.starts_with('\t') {
            return "\t";
        }
        let spaces = line.len() - line.trim_start_matches(' ').len();
        if spaces > 0 && !line.trim().is_empty() {
            return if spaces == 4 { "    " } else { "  " };
        }
    }
    "  "
}

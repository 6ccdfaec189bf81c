//! # Operation Executor
//!
//! Applies one typed [`Operation`] to a component's source text. The executor
//! owns the placement rules for hook-like declarations and imports; markup
//! edits are delegated to [`crate::markup`].
//!
//! ## Declaration ordering
//!
//! Hook declarations inside a component body keep a canonical relative order
//! given by [`DeclarationOrderClass`]. A new declaration is inserted directly
//! before the first existing ranked declaration whose rank is strictly greater
//! than its own, or after the last ranked declaration when none is. Applying
//! declarations in any order therefore yields a body sorted by rank, with ties
//! kept in insertion order.
//!
//! Every operation either applies completely or leaves the input untouched:
//! edits are computed as splices, re-parsed, and only then returned.

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::markup;
use crate::operation::{
    AddCallbackOp, AddEffectOp, AddImportOp, AddMemoOp, AddReducerOp, AddRefOp, AddStateOp,
    Operation,
};
use crate::syntax::{
    NodeId, Splice, SyntaxTree, indent_continuation, indent_unit, line_end,
    line_indent, line_start, starts_own_line,
};
use serde::Serialize;
use tracing::{debug, warn};

/// The rank of a hook-like declaration inside a component body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationOrderClass {
    State,
    Reducer,
    Ref,
    Memo,
    Callback,
    Effect,
}

impl DeclarationOrderClass {
    pub fn rank(self) -> u8 {
        match self {
            DeclarationOrderClass::State | DeclarationOrderClass::Reducer => 0,
            DeclarationOrderClass::Ref => 1,
            DeclarationOrderClass::Memo => 2,
            DeclarationOrderClass::Callback => 3,
            DeclarationOrderClass::Effect => 4,
        }
    }

    pub fn from_hook(name: &str) -> Option<Self> {
        let name = name.strip_prefix("React.").unwrap_or(name);
        match name {
            "useState" => Some(DeclarationOrderClass::State),
            "useReducer" => Some(DeclarationOrderClass::Reducer),
            "useRef" => Some(DeclarationOrderClass::Ref),
            "useMemo" => Some(DeclarationOrderClass::Memo),
            "useCallback" => Some(DeclarationOrderClass::Callback),
            "useEffect" | "useLayoutEffect" | "useInsertionEffect" => {
                Some(DeclarationOrderClass::Effect)
            }
            _ => None,
        }
    }

    pub fn hook_name(self) -> &'static str {
        match self {
            DeclarationOrderClass::State => "useState",
            DeclarationOrderClass::Reducer => "useReducer",
            DeclarationOrderClass::Ref => "useRef",
            DeclarationOrderClass::Memo => "useMemo",
            DeclarationOrderClass::Callback => "useCallback",
            DeclarationOrderClass::Effect => "useEffect",
        }
    }
}

/// The externally visible result of applying an operation.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub success: bool,
    /// The edited text on success, the unchanged input on failure.
    pub code: String,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl OperationOutcome {
    fn from_result(input: &str, result: EngineResult<String>) -> Self {
        match result {
            Ok(code) => Self {
                success: true,
                code,
                error: None,
                error_kind: None,
            },
            Err(e) => Self {
                success: false,
                code: input.to_string(),
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
            },
        }
    }
}

/// Applies one operation, reporting failure as a structured outcome.
pub fn apply_operation(source: &str, op: &Operation) -> OperationOutcome {
    OperationOutcome::from_result(source, execute(source, op))
}

/// Applies a batch of operations in order. The batch is atomic: if any
/// operation fails, the outcome carries the original input.
pub fn apply_operations(source: &str, ops: &[Operation]) -> OperationOutcome {
    let result = ops
        .iter()
        .try_fold(source.to_string(), |code, op| execute(&code, op));
    OperationOutcome::from_result(source, result)
}

/// Applies one operation and returns the new text.
pub fn execute(source: &str, op: &Operation) -> EngineResult<String> {
    let result = op
        .validate()
        .and_then(|_| SyntaxTree::parse(source))
        .and_then(|tree| dispatch(&tree, op));
    match &result {
        Ok(_) => debug!(kind = op.kind_name(), "applied operation"),
        Err(e) => warn!(kind = op.kind_name(), error = %e, "operation rejected"),
    }
    result.map(|tree| tree.serialize())
}

fn dispatch(tree: &SyntaxTree, op: &Operation) -> EngineResult<SyntaxTree> {
    match op {
        Operation::AddState(op) => add_declaration(tree, DeclarationOrderClass::State, &state_text(op)),
        Operation::AddReducer(op) => {
            add_declaration(tree, DeclarationOrderClass::Reducer, &reducer_text(op))
        }
        Operation::AddRef(op) => add_declaration(tree, DeclarationOrderClass::Ref, &ref_text(op)),
        Operation::AddMemo(op) => add_declaration(tree, DeclarationOrderClass::Memo, &memo_text(op)),
        Operation::AddCallback(op) => {
            add_declaration(tree, DeclarationOrderClass::Callback, &callback_text(op))
        }
        Operation::AddEffect(op) => {
            let unit = indent_unit(tree.source());
            add_declaration(tree, DeclarationOrderClass::Effect, &effect_text(op, unit))
        }
        Operation::AddImport(op) => add_import(tree, op),
        Operation::WrapElement(_)
        | Operation::InsertJsx(_)
        | Operation::ModifyProp(_)
        | Operation::ModifyClassName(_)
        | Operation::RemoveElement(_) => markup::apply(tree, op),
    }
}

/// Applies splices and re-parses. An edit that breaks the syntax is the
/// operation's fault, not the input's, so it is reported as malformed.
pub(crate) fn commit(tree: &SyntaxTree, splices: Vec<Splice>) -> EngineResult<SyntaxTree> {
    if splices.is_empty() {
        return Ok(tree.clone());
    }
    tree.apply_splices(splices).map_err(|e| match e {
        EngineError::Parse(msg) => {
            EngineError::MalformedOperation(format!("edit would produce invalid syntax: {msg}"))
        }
        other => other,
    })
}

// --- Declaration text ---

fn setter_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("set{}{}", first.to_uppercase(), chars.as_str()),
        None => "set".to_string(),
    }
}

fn type_args(annotation: &Option<String>) -> String {
    annotation
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("<{t}>"))
        .unwrap_or_default()
}

fn dependency_list(deps: &[String]) -> String {
    format!(
        "[{}]",
        deps.iter().map(|d| d.trim()).collect::<Vec<_>>().join(", ")
    )
}

fn state_text(op: &AddStateOp) -> String {
    format!(
        "const [{}, {}] = useState{}({});",
        op.name,
        setter_name(&op.name),
        type_args(&op.type_annotation),
        op.initial_value.trim()
    )
}

fn reducer_text(op: &AddReducerOp) -> String {
    format!(
        "const [{}, {}] = useReducer({}, {});",
        op.state_name,
        op.dispatch_name.as_deref().unwrap_or("dispatch"),
        op.reducer.trim(),
        op.initial_state.trim()
    )
}

fn ref_text(op: &AddRefOp) -> String {
    format!(
        "const {} = useRef{}({});",
        op.name,
        type_args(&op.type_annotation),
        op.initial_value.as_deref().map_or("null", str::trim)
    )
}

fn memo_text(op: &AddMemoOp) -> String {
    format!(
        "const {} = useMemo(() => {}, {});",
        op.name,
        op.compute.trim(),
        dependency_list(&op.dependencies)
    )
}

fn callback_text(op: &AddCallbackOp) -> String {
    let params = op
        .params
        .iter()
        .map(|p| p.trim())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "const {} = useCallback(({params}) => {}, {});",
        op.name,
        op.body.trim(),
        dependency_list(&op.dependencies)
    )
}

fn indent_all(text: &str, indent: &str) -> String {
    text.trim()
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{indent}{}", line.trim_end())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn effect_text(op: &AddEffectOp, unit: &str) -> String {
    let mut text = format!("useEffect(() => {{\n{}\n", indent_all(&op.body, unit));
    if let Some(cleanup) = op.cleanup.as_deref().filter(|c| !c.trim().is_empty()) {
        text.push_str(&format!(
            "{unit}return () => {{\n{}\n{unit}}};\n",
            indent_all(cleanup, &format!("{unit}{unit}"))
        ));
    }
    match &op.dependencies {
        Some(deps) => text.push_str(&format!("}}, {});", dependency_list(deps))),
        None => text.push_str("});"),
    }
    text
}

// --- Component body layout ---

/// The statement block of the component function and its top-level statements.
pub(crate) struct BodyLayout {
    pub body: NodeId,
    pub statements: Vec<NodeId>,
    pub return_statement: Option<NodeId>,
}

impl BodyLayout {
    pub fn of(tree: &SyntaxTree) -> EngineResult<Self> {
        let body = component_body(tree)?;
        let statements: Vec<NodeId> = tree
            .named_children(body)
            .filter(|&s| tree.kind(s) != "comment")
            .collect();
        let return_statement = statements
            .iter()
            .copied()
            .rev()
            .find(|&s| tree.kind(s) == "return_statement");
        Ok(Self {
            body,
            statements,
            return_statement,
        })
    }

    /// Statements before the render return; these form the declaration region.
    pub fn declaration_region(&self) -> &[NodeId] {
        match self.return_statement {
            Some(ret) => {
                let end = self
                    .statements
                    .iter()
                    .position(|&s| s == ret)
                    .unwrap_or(self.statements.len());
                &self.statements[..end]
            }
            None => &self.statements,
        }
    }
}

fn function_body(tree: &SyntaxTree, function: NodeId) -> Option<NodeId> {
    tree.child_by_field(function, "body")
        .filter(|&b| tree.kind(b) == "statement_block")
}

fn is_function(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration" | "function_expression" | "function" | "arrow_function"
    )
}

/// Finds the body of the component: the first capitalized function with a
/// block body, falling back to the first function with a block body.
fn component_body(tree: &SyntaxTree) -> EngineResult<NodeId> {
    let mut fallback = None;
    for id in tree.ids() {
        let kind = tree.kind(id);
        if is_function(kind) && fallback.is_none() {
            fallback = function_body(tree, id);
        }

        let (name, function) = match kind {
            "function_declaration" => (tree.child_by_field(id, "name"), Some(id)),
            "variable_declarator" => {
                let value = tree.child_by_field(id, "value");
                let function = value.and_then(|v| {
                    if is_function(tree.kind(v)) {
                        Some(v)
                    } else if tree.kind(v) == "call_expression" {
                        // `memo(() => ...)`, `forwardRef(function (props, ref) { ... })`
                        tree.descendants(v).find(|&d| is_function(tree.kind(d)))
                    } else {
                        None
                    }
                });
                (tree.child_by_field(id, "name"), function)
            }
            _ => continue,
        };

        let is_component_name =
            name.is_some_and(|n| tree.text(n).starts_with(|c: char| c.is_ascii_uppercase()));
        if let (true, Some(body)) = (is_component_name, function.and_then(|f| function_body(tree, f)))
        {
            return Ok(body);
        }
    }
    fallback.ok_or_else(|| {
        EngineError::TargetNotFound("no component function with a block body".to_string())
    })
}

fn callee_of(tree: &SyntaxTree, node: NodeId) -> Option<&str> {
    if tree.kind(node) != "call_expression" {
        return None;
    }
    tree.child_by_field(node, "function").map(|f| tree.text(f))
}

/// Classifies a body statement as a ranked hook declaration, if it is one.
pub(crate) fn classify(tree: &SyntaxTree, statement: NodeId) -> Option<DeclarationOrderClass> {
    match tree.kind(statement) {
        "lexical_declaration" | "variable_declaration" => tree
            .named_children(statement)
            .filter(|&d| tree.kind(d) == "variable_declarator")
            .find_map(|d| {
                let value = tree.child_by_field(d, "value")?;
                DeclarationOrderClass::from_hook(callee_of(tree, value)?)
            }),
        "expression_statement" => {
            let expr = tree.named_children(statement).next()?;
            DeclarationOrderClass::from_hook(callee_of(tree, expr)?)
        }
        _ => None,
    }
}

// --- Placement ---

fn insert_before_statement(tree: &SyntaxTree, statement: NodeId, text: &str) -> Splice {
    let src = tree.source();
    let start = tree.node(statement).start;
    if starts_own_line(src, start) {
        let indent = line_indent(src, start);
        Splice::insert(
            line_start(src, start),
            format!("{indent}{}\n", indent_continuation(text, indent)),
        )
    } else {
        Splice::insert(start, format!("{text} "))
    }
}

fn insert_after_statement(tree: &SyntaxTree, statement: NodeId, text: &str) -> Splice {
    let src = tree.source();
    let node = tree.node(statement);
    let rest = src[node.end..line_end(src, node.end)].trim();
    if rest.is_empty() || rest.starts_with("//") {
        let indent = line_indent(src, node.start);
        Splice::insert(
            line_end(src, node.end),
            format!("\n{indent}{}", indent_continuation(text, indent)),
        )
    } else {
        Splice::insert(node.end, format!(" {text}"))
    }
}

fn insert_at_body_start(tree: &SyntaxTree, layout: &BodyLayout, text: &str) -> Splice {
    if let Some(&first) = layout.statements.first() {
        return insert_before_statement(tree, first, text);
    }

    let src = tree.source();
    let body = tree.node(layout.body);
    let outer = line_indent(src, body.start);
    let indent = format!("{outer}{}", indent_unit(src));
    // An empty block: `{}` or `{ /* comment */ }`.
    let inner = (body.start + 1)..(body.end - 1);
    if src[inner.clone()].trim().is_empty() {
        Splice::replace(
            inner,
            format!("\n{indent}{}\n{outer}", indent_continuation(text, &indent)),
        )
    } else {
        Splice::insert(
            body.start + 1,
            format!("\n{indent}{}", indent_continuation(text, &indent)),
        )
    }
}

/// Computes where a ranked declaration belongs in the component body.
pub(crate) fn place_declaration(
    tree: &SyntaxTree,
    class: DeclarationOrderClass,
    text: &str,
) -> EngineResult<Splice> {
    let layout = BodyLayout::of(tree)?;
    let ranked: Vec<(NodeId, DeclarationOrderClass)> = layout
        .declaration_region()
        .iter()
        .filter_map(|&s| classify(tree, s).map(|c| (s, c)))
        .collect();

    if let Some(&(next, _)) = ranked.iter().find(|(_, c)| c.rank() > class.rank()) {
        return Ok(insert_before_statement(tree, next, text));
    }
    // Nothing outranks it: append to the end of the declaration region, after
    // any plain locals the new declaration may read.
    if let Some(&last) = layout.declaration_region().last() {
        return Ok(insert_after_statement(tree, last, text));
    }
    match layout.return_statement {
        Some(ret) => Ok(insert_before_statement(tree, ret, text)),
        None => Ok(insert_at_body_start(tree, &layout, text)),
    }
}

fn add_declaration(
    tree: &SyntaxTree,
    class: DeclarationOrderClass,
    text: &str,
) -> EngineResult<SyntaxTree> {
    let splice = place_declaration(tree, class, text)?;
    let declared = commit(tree, vec![splice])?;
    let hook_import = AddImportOp {
        source: "react".to_string(),
        default_import: None,
        named: vec![class.hook_name().to_string()],
    };
    add_import(&declared, &hook_import)
}

// --- Imports ---

struct ImportInfo {
    statement: NodeId,
    clause: Option<NodeId>,
    default: Option<String>,
    named_imports: Option<NodeId>,
    has_namespace: bool,
    specifiers: Vec<String>,
}

fn unquote(text: &str) -> &str {
    text.trim_matches(|c| c == '\'' || c == '"' || c == '`')
}

fn top_level_imports(tree: &SyntaxTree) -> Vec<NodeId> {
    tree.named_children(tree.root())
        .filter(|&s| tree.kind(s) == "import_statement")
        .collect()
}

fn import_info(tree: &SyntaxTree, statement: NodeId) -> ImportInfo {
    let clause = tree
        .named_children(statement)
        .find(|&c| tree.kind(c) == "import_clause");
    let mut info = ImportInfo {
        statement,
        clause,
        default: None,
        named_imports: None,
        has_namespace: false,
        specifiers: Vec::new(),
    };
    let Some(clause) = clause else {
        return info;
    };
    for part in tree.named_children(clause) {
        match tree.kind(part) {
            "identifier" => info.default = Some(tree.text(part).to_string()),
            "namespace_import" => info.has_namespace = true,
            "named_imports" => {
                info.named_imports = Some(part);
                info.specifiers = tree
                    .named_children(part)
                    .filter(|&s| tree.kind(s) == "import_specifier")
                    .map(|s| {
                        tree.child_by_field(s, "name")
                            .map_or_else(|| tree.text(s), |n| tree.text(n))
                            .to_string()
                    })
                    .collect();
            }
            _ => {}
        }
    }
    info
}

fn import_source(tree: &SyntaxTree, statement: NodeId) -> Option<&str> {
    tree.child_by_field(statement, "source")
        .map(|s| unquote(tree.text(s)))
}

/// Adds an import, merging into an existing import of the same module and
/// skipping specifiers that are already imported.
pub(crate) fn add_import(tree: &SyntaxTree, op: &AddImportOp) -> EngineResult<SyntaxTree> {
    let imports = top_level_imports(tree);
    let matching: Vec<ImportInfo> = imports
        .iter()
        .copied()
        .filter(|&s| import_source(tree, s) == Some(op.source.as_str()))
        .filter(|&s| !tree.text(s).starts_with("import type"))
        .map(|s| import_info(tree, s))
        .collect();

    let mut missing_named: Vec<&str> = Vec::new();
    for name in &op.named {
        let present = matching.iter().any(|i| i.specifiers.iter().any(|s| s == name));
        if !present && !missing_named.contains(&name.as_str()) {
            missing_named.push(name);
        }
    }
    let missing_default = op
        .default_import
        .as_deref()
        .filter(|d| !matching.iter().any(|i| i.default.as_deref() == Some(*d)));
    let side_effect_only = op.default_import.is_none() && op.named.is_empty();

    if missing_named.is_empty()
        && missing_default.is_none()
        && (!side_effect_only || has_bare_import(tree, &imports, &op.source))
    {
        debug!(source = %op.source, "import already present");
        return Ok(tree.clone());
    }

    let target = matching
        .iter()
        .find(|i| i.clause.is_some() && !i.has_namespace)
        .filter(|i| missing_default.is_none() || i.default.is_none());

    let splices = match target {
        Some(info) => merge_into_import(tree, info, missing_default, &missing_named),
        None => vec![new_import_statement(
            tree,
            &imports,
            &op.source,
            missing_default,
            &missing_named,
        )],
    };
    commit(tree, splices)
}

fn has_bare_import(tree: &SyntaxTree, imports: &[NodeId], source: &str) -> bool {
    imports
        .iter()
        .any(|&s| import_source(tree, s) == Some(source))
}

fn merge_into_import(
    tree: &SyntaxTree,
    info: &ImportInfo,
    missing_default: Option<&str>,
    missing_named: &[&str],
) -> Vec<Splice> {
    let mut splices = Vec::new();
    let Some(clause) = info.clause else {
        return splices;
    };
    if let Some(default) = missing_default {
        splices.push(Splice::insert(tree.node(clause).start, format!("{default}, ")));
    }
    if missing_named.is_empty() {
        return splices;
    }
    let names = missing_named.join(", ");
    match info.named_imports {
        Some(named) => {
            let last_specifier = tree
                .named_children(named)
                .filter(|&s| tree.kind(s) == "import_specifier")
                .last();
            match last_specifier {
                Some(last) => splices.push(Splice::insert(tree.node(last).end, format!(", {names}"))),
                None => splices.push(Splice::replace(tree.range(named), format!("{{ {names} }}"))),
            }
        }
        None => splices.push(Splice::insert(tree.node(clause).end, format!(", {{ {names} }}"))),
    }
    splices
}

fn new_import_statement(
    tree: &SyntaxTree,
    imports: &[NodeId],
    source: &str,
    default: Option<&str>,
    named: &[&str],
) -> Splice {
    let src = tree.source();
    let quote = match imports.first() {
        Some(&first) if tree.text(first).contains('"') && !tree.text(first).contains('\'') => '"',
        _ => '\'',
    };
    let semicolon = match imports.first() {
        Some(&first) if !tree.text(first).trim_end().ends_with(';') => "",
        _ => ";",
    };

    let mut bindings = Vec::new();
    if let Some(default) = default {
        bindings.push(default.to_string());
    }
    if !named.is_empty() {
        bindings.push(format!("{{ {} }}", named.join(", ")));
    }
    let statement = if bindings.is_empty() {
        format!("import {quote}{source}{quote}{semicolon}")
    } else {
        format!(
            "import {} from {quote}{source}{quote}{semicolon}",
            bindings.join(", ")
        )
    };

    if let Some(&last) = imports.last() {
        return Splice::insert(line_end(src, tree.node(last).end), format!("\n{statement}"));
    }

    // Keep leading directives such as 'use client' first.
    let last_directive = tree
        .named_children(tree.root())
        .take_while(|&s| {
            tree.kind(s) == "comment"
                || (tree.kind(s) == "expression_statement"
                    && tree
                        .named_children(s)
                        .next()
                        .is_some_and(|e| tree.kind(e) == "string"))
        })
        .filter(|&s| tree.kind(s) == "expression_statement")
        .last();
    match last_directive {
        Some(directive) => {
            let at = line_end(src, tree.node(directive).end);
            Splice::insert(at, format!("\n\n{statement}"))
        }
        None if src.trim().is_empty() => Splice::insert(0, format!("{statement}\n")),
        None => Splice::insert(0, format!("{statement}\n\n")),
    }
}

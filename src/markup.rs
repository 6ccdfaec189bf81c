//! # Markup Editing
//!
//! Local, structure-preserving edits to the JSX tree: wrapping an element,
//! splicing new children around or inside it, and editing its attributes.
//!
//! Elements are selected by tag name over the node table in document order.
//! When several elements share a tag, the selector's `index` picks one; the
//! default is the first match.

use crate::error::{EngineError, EngineResult};
use crate::executor::commit;
use crate::operation::{
    ElementSelector, InsertJsxOp, InsertPosition, ModifyClassNameOp, ModifyPropOp, Operation,
    PropValue, WrapElementOp,
};
use crate::syntax::{
    NodeId, Splice, SyntaxTree, ends_own_line, indent_continuation, indent_unit, line_end,
    line_indent, line_start, starts_own_line,
};

pub(crate) fn apply(tree: &SyntaxTree, op: &Operation) -> EngineResult<SyntaxTree> {
    let splices = match op {
        Operation::WrapElement(op) => vec![wrap_element(tree, op)?],
        Operation::InsertJsx(op) => vec![insert_jsx(tree, op)?],
        Operation::ModifyProp(op) => vec![modify_prop(tree, op)?],
        Operation::ModifyClassName(op) => modify_class_name(tree, op)?.into_iter().collect(),
        Operation::RemoveElement(op) => vec![remove_element(tree, &op.selector)?],
        _ => {
            return Err(EngineError::MalformedOperation(format!(
                "{} is not a markup operation",
                op.kind_name()
            )));
        }
    };
    commit(tree, splices)
}

fn is_element(kind: &str) -> bool {
    matches!(kind, "jsx_element" | "jsx_self_closing_element")
}

/// The node carrying the tag name and attributes of an element.
fn opening_tag(tree: &SyntaxTree, element: NodeId) -> NodeId {
    if tree.kind(element) == "jsx_self_closing_element" {
        return element;
    }
    tree.child_by_field(element, "open_tag")
        .or_else(|| {
            tree.named_children(element)
                .find(|&c| tree.kind(c) == "jsx_opening_element")
        })
        .unwrap_or(element)
}

fn closing_tag(tree: &SyntaxTree, element: NodeId) -> Option<NodeId> {
    tree.child_by_field(element, "close_tag").or_else(|| {
        tree.named_children(element)
            .find(|&c| tree.kind(c) == "jsx_closing_element")
    })
}

fn tag_name_node(tree: &SyntaxTree, element: NodeId) -> Option<NodeId> {
    let opening = opening_tag(tree, element);
    tree.child_by_field(opening, "name").or_else(|| {
        tree.named_children(opening)
            .find(|&c| !matches!(tree.kind(c), "jsx_attribute" | "jsx_expression" | "comment"))
    })
}

pub fn tag_name(tree: &SyntaxTree, element: NodeId) -> Option<&str> {
    tag_name_node(tree, element).map(|n| tree.text(n))
}

/// All elements with a tag name, in document order. Fragments are skipped.
pub fn elements(tree: &SyntaxTree) -> impl Iterator<Item = (NodeId, &str)> + '_ {
    tree.ids()
        .filter(|&id| is_element(tree.kind(id)))
        .filter_map(|id| tag_name(tree, id).map(|tag| (id, tag)))
}

/// Resolves a selector to an element. Document order is the tie-break.
pub fn select_element(tree: &SyntaxTree, selector: &ElementSelector) -> EngineResult<NodeId> {
    let matches: Vec<NodeId> = elements(tree)
        .filter(|(_, tag)| *tag == selector.tag)
        .map(|(id, _)| id)
        .collect();
    match matches.get(selector.index) {
        Some(&id) => Ok(id),
        None if matches.is_empty() => Err(EngineError::TargetNotFound(format!(
            "no <{}> element in file",
            selector.tag
        ))),
        None => Err(EngineError::TargetNotFound(format!(
            "{selector} requested but only {} <{}> element(s) exist",
            matches.len(),
            selector.tag
        ))),
    }
}

fn attributes(tree: &SyntaxTree, element: NodeId) -> Vec<NodeId> {
    tree.named_children(opening_tag(tree, element))
        .filter(|&c| tree.kind(c) == "jsx_attribute")
        .collect()
}

fn attribute_name(tree: &SyntaxTree, attribute: NodeId) -> &str {
    tree.children(attribute)
        .first()
        .map_or("", |&n| tree.text(n))
}

fn attribute_value(tree: &SyntaxTree, attribute: NodeId) -> Option<NodeId> {
    let children = tree.children(attribute);
    if children.len() > 2 {
        children.last().copied()
    } else {
        None
    }
}

fn find_attribute(tree: &SyntaxTree, element: NodeId, name: &str) -> Option<NodeId> {
    attributes(tree, element)
        .into_iter()
        .find(|&a| attribute_name(tree, a) == name)
}

/// Where a new attribute goes: after the last attribute, or after the tag name.
fn attribute_insertion_point(tree: &SyntaxTree, element: NodeId) -> EngineResult<usize> {
    if let Some(&last) = attributes(tree, element).last() {
        return Ok(tree.node(last).end);
    }
    tag_name_node(tree, element)
        .map(|n| tree.node(n).end)
        .ok_or_else(|| EngineError::TargetNotFound("element has no tag name".to_string()))
}

fn wrap_element(tree: &SyntaxTree, op: &WrapElementOp) -> EngineResult<Splice> {
    let element = select_element(tree, &op.selector)?;
    let src = tree.source();
    let range = tree.range(element);
    let props: String = op
        .wrapper_props
        .iter()
        .map(|p| format!(" {}", p.render()))
        .collect();
    let open = format!("<{}{props}>", op.wrapper_tag);
    let close = format!("</{}>", op.wrapper_tag);

    let text = if starts_own_line(src, range.start) {
        let indent = line_indent(src, range.start);
        let unit = indent_unit(src);
        let inner = indent_continuation(tree.text(element), unit);
        format!("{open}\n{indent}{unit}{inner}\n{indent}{close}")
    } else {
        format!("{open}{}{close}", tree.text(element))
    };
    Ok(Splice::replace(range, text))
}

/// Rejects snippets that are not well-formed markup on their own.
fn check_snippet(jsx: &str) -> EngineResult<()> {
    SyntaxTree::parse(&format!("const snippet = (<>{jsx}</>);"))
        .map(|_| ())
        .map_err(|e| EngineError::MalformedOperation(format!("`jsx` is not valid markup: {e}")))
}

fn insert_jsx(tree: &SyntaxTree, op: &InsertJsxOp) -> EngineResult<Splice> {
    let jsx = op.jsx.trim();
    check_snippet(jsx)?;
    let element = select_element(tree, &op.selector)?;
    let src = tree.source();
    let node = tree.node(element);
    let indent = line_indent(src, node.start);
    let child_indent = format!("{indent}{}", indent_unit(src));

    let splice = match op.position {
        InsertPosition::Before if starts_own_line(src, node.start) => Splice::insert(
            line_start(src, node.start),
            format!("{indent}{}\n", indent_continuation(jsx, indent)),
        ),
        InsertPosition::Before => Splice::insert(node.start, jsx),
        InsertPosition::After if ends_own_line(src, node.end) => Splice::insert(
            line_end(src, node.end),
            format!("\n{indent}{}", indent_continuation(jsx, indent)),
        ),
        InsertPosition::After => Splice::insert(node.end, jsx),
        InsertPosition::InsideStart | InsertPosition::InsideEnd
            if tree.kind(element) == "jsx_self_closing_element" =>
        {
            let tag = tag_name(tree, element).unwrap_or_default();
            let head = tree
                .text(element)
                .trim_end_matches('>')
                .trim_end()
                .trim_end_matches('/')
                .trim_end();
            Splice::replace(tree.range(element), format!("{head}>{jsx}</{tag}>"))
        }
        InsertPosition::InsideStart => {
            let opening = tree.node(opening_tag(tree, element));
            let multiline = closing_tag(tree, element)
                .is_some_and(|c| starts_own_line(src, tree.node(c).start));
            if multiline {
                Splice::insert(
                    opening.end,
                    format!("\n{child_indent}{}", indent_continuation(jsx, &child_indent)),
                )
            } else {
                Splice::insert(opening.end, jsx)
            }
        }
        InsertPosition::InsideEnd => {
            let closing = closing_tag(tree, element).ok_or_else(|| {
                EngineError::TargetNotFound(format!("{} has no closing tag", op.selector))
            })?;
            let start = tree.node(closing).start;
            if starts_own_line(src, start) {
                Splice::insert(
                    line_start(src, start),
                    format!("{child_indent}{}\n", indent_continuation(jsx, &child_indent)),
                )
            } else {
                Splice::insert(start, jsx)
            }
        }
    };
    Ok(splice)
}

/// Extends a range backwards over the whitespace that separates it from the
/// previous token.
fn with_leading_whitespace(src: &str, start: usize) -> usize {
    let trimmed = src[..start].trim_end();
    trimmed.len()
}

fn modify_prop(tree: &SyntaxTree, op: &ModifyPropOp) -> EngineResult<Splice> {
    let element = select_element(tree, &op.selector)?;
    let existing = find_attribute(tree, element, &op.name);

    if op.remove {
        let attribute = existing.ok_or_else(|| {
            EngineError::TargetNotFound(format!("prop `{}` not found on {}", op.name, op.selector))
        })?;
        let range = tree.range(attribute);
        let start = with_leading_whitespace(tree.source(), range.start);
        return Ok(Splice::delete(start..range.end));
    }

    let value = op
        .value
        .as_ref()
        .ok_or_else(|| EngineError::MalformedOperation("`value` is required".to_string()))?;
    let rendered = value.render(&op.name);
    match existing {
        Some(attribute) => Ok(Splice::replace(tree.range(attribute), rendered)),
        None => Ok(Splice::insert(
            attribute_insertion_point(tree, element)?,
            format!(" {rendered}"),
        )),
    }
}

/// Reads a literal class list from a `className` value, if it is one.
fn literal_classes(tree: &SyntaxTree, value: NodeId) -> Option<(char, String)> {
    let literal = match tree.kind(value) {
        "string" => value,
        "jsx_expression" => {
            let inner = tree.named_children(value).next()?;
            if tree.kind(inner) != "string" {
                return None;
            }
            inner
        }
        _ => return None,
    };
    let text = tree.text(literal);
    let quote = text.chars().next()?;
    Some((quote, text.trim_matches(quote).to_string()))
}

fn modify_class_name(tree: &SyntaxTree, op: &ModifyClassNameOp) -> EngineResult<Option<Splice>> {
    let element = select_element(tree, &op.selector)?;
    let Some(attribute) = find_attribute(tree, element, "className") else {
        if op.add.is_empty() {
            return Ok(None);
        }
        let value = PropValue::String(op.add.join(" "));
        return Ok(Some(Splice::insert(
            attribute_insertion_point(tree, element)?,
            format!(" {}", value.render("className")),
        )));
    };

    let (quote, current) = attribute_value(tree, attribute)
        .and_then(|v| literal_classes(tree, v))
        .ok_or_else(|| {
            EngineError::MalformedOperation(format!(
                "className on {} is a dynamic expression and cannot be edited as a list",
                op.selector
            ))
        })?;

    let mut classes: Vec<&str> = current
        .split_whitespace()
        .filter(|c| !op.remove.iter().any(|r| r == c))
        .collect();
    for class in &op.add {
        if !classes.contains(&class.as_str()) {
            classes.push(class);
        }
    }

    let range = tree.range(attribute);
    if classes.is_empty() {
        let start = with_leading_whitespace(tree.source(), range.start);
        return Ok(Some(Splice::delete(start..range.end)));
    }
    Ok(Some(Splice::replace(
        range,
        format!("className={quote}{}{quote}", classes.join(" ")),
    )))
}

fn remove_element(tree: &SyntaxTree, selector: &ElementSelector) -> EngineResult<Splice> {
    let element = select_element(tree, selector)?;
    let src = tree.source();
    let range = tree.range(element);
    if starts_own_line(src, range.start) && ends_own_line(src, range.end) {
        let end = (line_end(src, range.end) + 1).min(src.len());
        Ok(Splice::delete(line_start(src, range.start)..end))
    } else {
        Ok(Splice::delete(range))
    }
}

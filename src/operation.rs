//! Defines the typed, semantic edit operations the executor understands.
//!
//! Operations arrive as JSON objects tagged by `type` (`AST_ADD_STATE`,
//! `AST_MODIFY_PROP`, ...). Each variant carries only the fields its edit needs,
//! and [`Operation::from_json`] rejects an incomplete or invalid payload before
//! any tree is touched.

use crate::error::{EngineError, EngineResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static IDENTIFIER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("Invalid regex"));

static TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_$]*([.:-][A-Za-z0-9_$]+)*$").expect("Invalid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    #[serde(rename = "AST_ADD_STATE")]
    AddState(AddStateOp),
    #[serde(rename = "AST_ADD_REF")]
    AddRef(AddRefOp),
    #[serde(rename = "AST_ADD_MEMO")]
    AddMemo(AddMemoOp),
    #[serde(rename = "AST_ADD_CALLBACK")]
    AddCallback(AddCallbackOp),
    #[serde(rename = "AST_ADD_REDUCER")]
    AddReducer(AddReducerOp),
    #[serde(rename = "AST_ADD_EFFECT")]
    AddEffect(AddEffectOp),
    #[serde(rename = "AST_ADD_IMPORT")]
    AddImport(AddImportOp),
    #[serde(rename = "AST_WRAP_ELEMENT")]
    WrapElement(WrapElementOp),
    #[serde(rename = "AST_INSERT_JSX")]
    InsertJsx(InsertJsxOp),
    #[serde(rename = "AST_MODIFY_PROP")]
    ModifyProp(ModifyPropOp),
    #[serde(rename = "AST_MODIFY_CLASS_NAME")]
    ModifyClassName(ModifyClassNameOp),
    #[serde(rename = "AST_REMOVE_ELEMENT")]
    RemoveElement(RemoveElementOp),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStateOp {
    pub name: String,
    pub initial_value: String,
    pub type_annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRefOp {
    pub name: String,
    pub initial_value: Option<String>,
    pub type_annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemoOp {
    pub name: String,
    /// The expression the memo returns.
    pub compute: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCallbackOp {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    /// Either an expression or a `{ ... }` block.
    pub body: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReducerOp {
    pub state_name: String,
    pub dispatch_name: Option<String>,
    pub reducer: String,
    pub initial_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEffectOp {
    pub body: String,
    /// `None` omits the dependency array; `Some(vec![])` runs once on mount.
    pub dependencies: Option<Vec<String>>,
    pub cleanup: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddImportOp {
    pub source: String,
    pub default_import: Option<String>,
    #[serde(default)]
    pub named: Vec<String>,
}

/// Locates a markup element by tag name; `index` picks the n-th match in
/// document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSelector {
    pub tag: String,
    #[serde(default)]
    pub index: usize,
}

impl std::fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.index == 0 {
            write!(f, "<{}>", self.tag)
        } else {
            write!(f, "<{}>#{}", self.tag, self.index)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapElementOp {
    pub selector: ElementSelector,
    pub wrapper_tag: String,
    #[serde(default)]
    pub wrapper_props: Vec<PropAssignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPosition {
    Before,
    After,
    InsideStart,
    InsideEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertJsxOp {
    pub selector: ElementSelector,
    pub position: InsertPosition,
    pub jsx: String,
}

/// The value side of a JSX attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropValue {
    /// Serialized as a quoted literal: `name="value"`.
    String(String),
    /// Serialized in braces: `name={value}`.
    Expression(String),
    /// `true` serializes as the bare attribute name, `false` as `name={false}`.
    Flag(bool),
}

impl PropValue {
    pub fn render(&self, name: &str) -> String {
        match self {
            PropValue::String(s) => format!("{name}=\"{}\"", s.replace('"', "&quot;")),
            PropValue::Expression(e) => format!("{name}={{{}}}", e.trim()),
            PropValue::Flag(true) => name.to_string(),
            PropValue::Flag(false) => format!("{name}={{false}}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropAssignment {
    pub name: String,
    pub value: PropValue,
}

impl PropAssignment {
    pub fn render(&self) -> String {
        self.value.render(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyPropOp {
    pub selector: ElementSelector,
    pub name: String,
    pub value: Option<PropValue>,
    #[serde(default)]
    pub remove: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyClassNameOp {
    pub selector: ElementSelector,
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveElementOp {
    pub selector: ElementSelector,
}

impl Operation {
    /// Deserializes and validates an operation payload.
    pub fn from_json(value: serde_json::Value) -> EngineResult<Self> {
        let op: Operation = serde_json::from_value(value)
            .map_err(|e| EngineError::MalformedOperation(e.to_string()))?;
        op.validate()?;
        Ok(op)
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| EngineError::MalformedOperation(format!("invalid JSON: {e}")))?;
        Self::from_json(value)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Operation::AddState(_) => "AST_ADD_STATE",
            Operation::AddRef(_) => "AST_ADD_REF",
            Operation::AddMemo(_) => "AST_ADD_MEMO",
            Operation::AddCallback(_) => "AST_ADD_CALLBACK",
            Operation::AddReducer(_) => "AST_ADD_REDUCER",
            Operation::AddEffect(_) => "AST_ADD_EFFECT",
            Operation::AddImport(_) => "AST_ADD_IMPORT",
            Operation::WrapElement(_) => "AST_WRAP_ELEMENT",
            Operation::InsertJsx(_) => "AST_INSERT_JSX",
            Operation::ModifyProp(_) => "AST_MODIFY_PROP",
            Operation::ModifyClassName(_) => "AST_MODIFY_CLASS_NAME",
            Operation::RemoveElement(_) => "AST_REMOVE_ELEMENT",
        }
    }

    /// Checks the fields serde cannot: identifiers, non-empty expressions,
    /// mutually exclusive options.
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Operation::AddState(op) => {
                identifier("name", &op.name)?;
                expression("initialValue", &op.initial_value)?;
            }
            Operation::AddRef(op) => {
                identifier("name", &op.name)?;
                if let Some(init) = &op.initial_value {
                    expression("initialValue", init)?;
                }
            }
            Operation::AddMemo(op) => {
                identifier("name", &op.name)?;
                expression("compute", &op.compute)?;
                dependencies(&op.dependencies)?;
            }
            Operation::AddCallback(op) => {
                identifier("name", &op.name)?;
                expression("body", &op.body)?;
                for param in &op.params {
                    expression("params", param)?;
                }
                dependencies(&op.dependencies)?;
            }
            Operation::AddReducer(op) => {
                identifier("stateName", &op.state_name)?;
                if let Some(dispatch) = &op.dispatch_name {
                    identifier("dispatchName", dispatch)?;
                }
                expression("reducer", &op.reducer)?;
                expression("initialState", &op.initial_state)?;
            }
            Operation::AddEffect(op) => {
                expression("body", &op.body)?;
                if let Some(deps) = &op.dependencies {
                    dependencies(deps)?;
                }
            }
            Operation::AddImport(op) => {
                expression("source", &op.source)?;
                if op.source.contains(['\'', '"', '\n']) {
                    return Err(malformed("source must be a bare module path"));
                }
                if let Some(default) = &op.default_import {
                    identifier("defaultImport", default)?;
                }
                for name in &op.named {
                    identifier("named", name)?;
                }
            }
            Operation::WrapElement(op) => {
                selector(&op.selector)?;
                tag("wrapperTag", &op.wrapper_tag)?;
                for prop in &op.wrapper_props {
                    prop_name(&prop.name)?;
                }
            }
            Operation::InsertJsx(op) => {
                selector(&op.selector)?;
                expression("jsx", &op.jsx)?;
            }
            Operation::ModifyProp(op) => {
                selector(&op.selector)?;
                prop_name(&op.name)?;
                match (&op.value, op.remove) {
                    (Some(_), true) => {
                        return Err(malformed("`value` and `remove` are mutually exclusive"));
                    }
                    (None, false) => return Err(malformed("either `value` or `remove` is required")),
                    _ => {}
                }
            }
            Operation::ModifyClassName(op) => {
                selector(&op.selector)?;
                if op.add.is_empty() && op.remove.is_empty() {
                    return Err(malformed("at least one of `add` or `remove` is required"));
                }
                for class in op.add.iter().chain(&op.remove) {
                    if class.trim().is_empty() || class.contains(char::is_whitespace) {
                        return Err(malformed(format!("invalid class name '{class}'")));
                    }
                }
            }
            Operation::RemoveElement(op) => selector(&op.selector)?,
        }
        Ok(())
    }
}

fn malformed(message: impl Into<String>) -> EngineError {
    EngineError::MalformedOperation(message.into())
}

fn identifier(field: &str, value: &str) -> EngineResult<()> {
    if IDENTIFIER_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(malformed(format!("`{field}` must be an identifier, got '{value}'")))
    }
}

fn expression(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        Err(malformed(format!("`{field}` must not be empty")))
    } else {
        Ok(())
    }
}

fn dependencies(deps: &[String]) -> EngineResult<()> {
    for dep in deps {
        expression("dependencies", dep)?;
    }
    Ok(())
}

fn tag(field: &str, value: &str) -> EngineResult<()> {
    if TAG_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(malformed(format!("`{field}` must be a tag name, got '{value}'")))
    }
}

fn selector(selector: &ElementSelector) -> EngineResult<()> {
    tag("selector.tag", &selector.tag)
}

fn prop_name(name: &str) -> EngineResult<()> {
    if TAG_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(malformed(format!("invalid prop name '{name}'")))
    }
}

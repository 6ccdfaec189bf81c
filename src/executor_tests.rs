#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::executor::{apply_operation, apply_operations};
    use crate::operation::Operation;
    use serde_json::json;

    const COUNTER: &str = r#"import React, { useState } from 'react';

export default function Counter() {
  const [count, setCount] = useState(0);

  return (
    <div className="counter">
      <span>{count}</span>
      <button onClick={() => setCount(count + 1)}>+</button>
    </div>
  );
}
"#;

    fn op(value: serde_json::Value) -> Operation {
        Operation::from_json(value).unwrap()
    }

    fn apply_ok(source: &str, value: serde_json::Value) -> String {
        let outcome = apply_operation(source, &op(value));
        assert!(outcome.success, "operation failed: {:?}", outcome.error);
        outcome.code
    }

    fn position(code: &str, needle: &str) -> usize {
        code.find(needle)
            .unwrap_or_else(|| panic!("`{needle}` not found in:\n{code}"))
    }

    #[test]
    fn test_add_ref_goes_after_state_and_merges_import() {
        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_ADD_REF", "name": "inputRef"}),
        );
        assert!(code.contains(
            "  const [count, setCount] = useState(0);\n  const inputRef = useRef(null);\n"
        ));
        assert!(code.starts_with("import React, { useState, useRef } from 'react';\n"));
    }

    #[test]
    fn test_declarations_sort_regardless_of_application_order() {
        let mut code = "import React from 'react';\n\nfunction App() {\n  return <div />;\n}\n".to_string();
        let ops = [
            json!({"type": "AST_ADD_EFFECT", "body": "console.log(total);", "dependencies": ["total"]}),
            json!({"type": "AST_ADD_CALLBACK", "name": "reset", "body": "setItems([])", "dependencies": []}),
            json!({"type": "AST_ADD_MEMO", "name": "total", "compute": "items.length", "dependencies": ["items"]}),
            json!({"type": "AST_ADD_REF", "name": "listRef"}),
            json!({"type": "AST_ADD_STATE", "name": "items", "initialValue": "[]"}),
        ];
        for value in ops {
            code = apply_ok(&code, value);
        }

        let order = [
            position(&code, "useState("),
            position(&code, "useRef("),
            position(&code, "useMemo("),
            position(&code, "useCallback("),
            position(&code, "useEffect("),
            position(&code, "return <div />"),
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]), "unsorted body:\n{code}");
        assert!(code.contains("const total = useMemo(() => items.length, [items]);"));
        assert!(code.contains("const reset = useCallback(() => setItems([]), []);"));
        assert!(code.starts_with(
            "import React, { useEffect, useCallback, useMemo, useRef, useState } from 'react';\n"
        ));
    }

    #[test]
    fn test_state_in_empty_body_creates_import() {
        let code = apply_ok(
            "function App() {}\n",
            json!({"type": "AST_ADD_STATE", "name": "x", "initialValue": "1"}),
        );
        assert_eq!(
            code,
            "import { useState } from 'react';\n\nfunction App() {\n  const [x, setX] = useState(1);\n}\n"
        );
    }

    #[test]
    fn test_typed_state_and_ref() {
        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_ADD_STATE", "name": "label", "initialValue": "''", "typeAnnotation": "string"}),
        );
        assert!(code.contains("const [label, setLabel] = useState<string>('');"));

        let code = apply_ok(
            &code,
            json!({"type": "AST_ADD_REF", "name": "el", "typeAnnotation": "HTMLDivElement | null", "initialValue": "null"}),
        );
        assert!(code.contains("const el = useRef<HTMLDivElement | null>(null);"));
    }

    #[test]
    fn test_effect_with_cleanup_is_indented() {
        let code = apply_ok(
            COUNTER,
            json!({
                "type": "AST_ADD_EFFECT",
                "body": "const id = setInterval(tick, 1000);",
                "cleanup": "clearInterval(id);",
                "dependencies": []
            }),
        );
        assert!(code.contains(
            "  useEffect(() => {\n    const id = setInterval(tick, 1000);\n    return () => {\n      clearInterval(id);\n    };\n  }, []);"
        ));
        assert!(position(&code, "useState(0)") < position(&code, "useEffect(() =>"));
        assert!(code.contains("{ useState, useEffect }"));
    }

    #[test]
    fn test_reducer_uses_default_dispatch_name() {
        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_ADD_REDUCER", "stateName": "form", "reducer": "formReducer", "initialState": "initialForm"}),
        );
        assert!(code.contains("const [form, dispatch] = useReducer(formReducer, initialForm);"));
    }

    #[test]
    fn test_memo_goes_after_the_locals_it_reads() {
        let source = "function List({ data }) {\n  const items = data.filter(Boolean);\n  return <ul>{items.length}</ul>;\n}\n";
        let memo = json!({"type": "AST_ADD_MEMO", "name": "total", "compute": "items.length", "dependencies": ["items"]});

        let code = apply_ok(source, memo.clone());
        assert!(code.contains(
            "  const items = data.filter(Boolean);\n  const total = useMemo(() => items.length, [items]);\n  return <ul>"
        ));

        let with_state = source.replace(
            "{ data }) {\n",
            "{ data }) {\n  const [open, setOpen] = useState(false);\n",
        );
        let code = apply_ok(&with_state, memo);
        assert!(position(&code, "useState(false)") < position(&code, "const items ="));
        assert!(position(&code, "const items =") < position(&code, "const total = useMemo("));
        assert!(position(&code, "const total = useMemo(") < position(&code, "return <ul>"));

        let code = apply_ok(
            &code,
            json!({"type": "AST_ADD_STATE", "name": "query", "initialValue": "''"}),
        );
        assert!(position(&code, "useState('')") < position(&code, "useMemo("));
    }

    #[test]
    fn test_arrow_component_body_is_found() {
        let source = "const Card = ({ title }: { title: string }) => {\n  return <h1>{title}</h1>;\n};\n";
        let code = apply_ok(
            source,
            json!({"type": "AST_ADD_STATE", "name": "open", "initialValue": "false"}),
        );
        assert!(code.contains("=> {\n  const [open, setOpen] = useState(false);\n  return <h1>"));
    }

    #[test]
    fn test_expression_bodied_component_is_not_a_target() {
        let source = "const Card = () => <h1 />;\n";
        let outcome = apply_operation(
            source,
            &op(json!({"type": "AST_ADD_STATE", "name": "open", "initialValue": "false"})),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::TargetNotFound));
        assert_eq!(outcome.code, source);
    }

    #[test]
    fn test_import_is_idempotent() {
        let add = json!({"type": "AST_ADD_IMPORT", "source": "react", "named": ["useState"]});
        assert_eq!(apply_ok(COUNTER, add.clone()), COUNTER);

        let add = json!({"type": "AST_ADD_IMPORT", "source": "clsx", "defaultImport": "clsx"});
        let once = apply_ok(COUNTER, add.clone());
        let twice = apply_ok(&once, add);
        assert_eq!(once, twice);
        assert!(once.contains("import React, { useState } from 'react';\nimport clsx from 'clsx';\n"));
    }

    #[test]
    fn test_import_after_directive() {
        let source = "'use client';\n\nexport function App() {\n  return <div />;\n}\n";
        let code = apply_ok(
            source,
            json!({"type": "AST_ADD_IMPORT", "source": "./api", "named": ["fetchUser", "saveUser"]}),
        );
        assert!(code.starts_with(
            "'use client';\n\nimport { fetchUser, saveUser } from './api';\n\nexport function App()"
        ));
    }

    #[test]
    fn test_selector_defaults_to_first_match() {
        let source = "function List() {\n  return (\n    <ul>\n      <span>a</span>\n      <span>b</span>\n    </ul>\n  );\n}\n";
        let code = apply_ok(
            source,
            json!({"type": "AST_MODIFY_PROP", "selector": {"tag": "span"}, "name": "title", "value": {"string": "x"}}),
        );
        assert!(code.contains("<span title=\"x\">a</span>"));
        assert!(code.contains("<span>b</span>"));

        let code = apply_ok(
            source,
            json!({"type": "AST_MODIFY_PROP", "selector": {"tag": "span", "index": 1}, "name": "hidden", "value": {"flag": true}}),
        );
        assert!(code.contains("<span>a</span>"));
        assert!(code.contains("<span hidden>b</span>"));
    }

    #[test]
    fn test_selector_index_out_of_range() {
        let outcome = apply_operation(
            COUNTER,
            &op(json!({"type": "AST_REMOVE_ELEMENT", "selector": {"tag": "span", "index": 3}})),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::TargetNotFound));
        assert_eq!(outcome.code, COUNTER);
    }

    #[test]
    fn test_modify_prop_replaces_and_removes() {
        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_MODIFY_PROP", "selector": {"tag": "button"}, "name": "onClick", "value": {"expression": "handleClick"}}),
        );
        assert!(code.contains("<button onClick={handleClick}>+</button>"));

        let code = apply_ok(
            &code,
            json!({"type": "AST_MODIFY_PROP", "selector": {"tag": "button"}, "name": "onClick", "remove": true}),
        );
        assert!(code.contains("<button>+</button>"));

        let outcome = apply_operation(
            &code,
            &op(json!({"type": "AST_MODIFY_PROP", "selector": {"tag": "button"}, "name": "onClick", "remove": true})),
        );
        assert_eq!(outcome.error_kind, Some(ErrorKind::TargetNotFound));
    }

    #[test]
    fn test_wrap_element_on_its_own_line() {
        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_WRAP_ELEMENT", "selector": {"tag": "span"}, "wrapperTag": "section",
                   "wrapperProps": [{"name": "id", "value": {"string": "count"}}]}),
        );
        assert!(code.contains(
            "      <section id=\"count\">\n        <span>{count}</span>\n      </section>\n"
        ));
    }

    #[test]
    fn test_insert_jsx_positions() {
        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_INSERT_JSX", "selector": {"tag": "div"}, "position": "inside_end", "jsx": "<p>hi</p>"}),
        );
        assert!(code.contains("</button>\n      <p>hi</p>\n    </div>"));

        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_INSERT_JSX", "selector": {"tag": "button"}, "position": "before", "jsx": "<hr />"}),
        );
        assert!(code.contains("      <hr />\n      <button"));

        let code = apply_ok(
            "const A = () => {\n  return <p><img src=\"a.png\" /></p>;\n};\n",
            json!({"type": "AST_INSERT_JSX", "selector": {"tag": "img"}, "position": "inside_start", "jsx": "<b />"}),
        );
        assert!(code.contains("<img src=\"a.png\"><b /></img>"));
    }

    #[test]
    fn test_insert_jsx_rejects_unbalanced_snippet() {
        let outcome = apply_operation(
            COUNTER,
            &op(json!({"type": "AST_INSERT_JSX", "selector": {"tag": "div"}, "position": "inside_end", "jsx": "<p>hi"})),
        );
        assert_eq!(outcome.error_kind, Some(ErrorKind::MalformedOperation));
        assert_eq!(outcome.code, COUNTER);
    }

    #[test]
    fn test_remove_element_drops_its_line() {
        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_REMOVE_ELEMENT", "selector": {"tag": "button"}}),
        );
        assert!(code.contains("<span>{count}</span>\n    </div>"));
        assert!(!code.contains("<button"));
    }

    #[test]
    fn test_class_name_edits() {
        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_MODIFY_CLASS_NAME", "selector": {"tag": "div"}, "add": ["active"], "remove": ["counter"]}),
        );
        assert!(code.contains("<div className=\"active\">"));

        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_MODIFY_CLASS_NAME", "selector": {"tag": "div"}, "add": ["counter", "wide"]}),
        );
        assert!(code.contains("<div className=\"counter wide\">"));

        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_MODIFY_CLASS_NAME", "selector": {"tag": "div"}, "remove": ["counter"]}),
        );
        assert!(code.contains("    <div>\n"));

        let code = apply_ok(
            COUNTER,
            json!({"type": "AST_MODIFY_CLASS_NAME", "selector": {"tag": "span"}, "add": ["value"]}),
        );
        assert!(code.contains("<span className=\"value\">{count}</span>"));
    }

    #[test]
    fn test_dynamic_class_name_is_rejected() {
        let source = "function A() {\n  return <div className={styles.box} />;\n}\n";
        let outcome = apply_operation(
            source,
            &op(json!({"type": "AST_MODIFY_CLASS_NAME", "selector": {"tag": "div"}, "add": ["x"]})),
        );
        assert_eq!(outcome.error_kind, Some(ErrorKind::MalformedOperation));
        assert_eq!(outcome.code, source);
    }

    #[test]
    fn test_unparseable_input_is_reported() {
        let source = "function A() { return (<div>; }";
        let outcome = apply_operation(
            source,
            &op(json!({"type": "AST_ADD_STATE", "name": "a", "initialValue": "1"})),
        );
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, Some(ErrorKind::ParseError));
        assert_eq!(outcome.code, source);
    }

    #[test]
    fn test_batch_is_atomic() {
        let ops = vec![
            op(json!({"type": "AST_ADD_STATE", "name": "open", "initialValue": "false"})),
            op(json!({"type": "AST_REMOVE_ELEMENT", "selector": {"tag": "table"}})),
        ];
        let outcome = apply_operations(COUNTER, &ops);
        assert!(!outcome.success);
        assert_eq!(outcome.code, COUNTER);

        let outcome = apply_operations(COUNTER, &ops[..1]);
        assert!(outcome.success);
        assert!(outcome.code.contains("useState(false)"));
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = apply_operation(
            COUNTER,
            &op(json!({"type": "AST_REMOVE_ELEMENT", "selector": {"tag": "table"}})),
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["errorKind"], json!("TARGET_NOT_FOUND"));

        let outcome = apply_operation(
            COUNTER,
            &op(json!({"type": "AST_ADD_IMPORT", "source": "react", "named": ["useState"]})),
        );
        let value = serde_json::to_value(&outcome).unwrap();
        assert!(value.get("error").is_none());
    }
}

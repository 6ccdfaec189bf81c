//! Shallow well-formedness gate for generated file bodies.
//!
//! This is a heuristic filter against grossly malformed model output, not a
//! parser. Brace counting is naive, so markup such as `style={{ ... }}` or text
//! containing a literal brace can skew it; a small imbalance is tolerated.

use crate::error::{EngineError, EngineResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default allowed difference between `{` and `}` counts.
pub const BRACE_TOLERANCE: usize = 2;

static CODE_KEYWORD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(import|export|function|const|let|var|class|return|if|for|while|interface|type)\b",
    )
    .expect("Invalid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSettings {
    pub brace_tolerance: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            brace_tolerance: BRACE_TOLERANCE,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Balance {
    open: usize,
    close: usize,
}

impl Balance {
    fn difference(self) -> usize {
        self.open.abs_diff(self.close)
    }
}

fn count(text: &str, open: char, close: char) -> Balance {
    text.chars().fold(Balance::default(), |mut b, c| {
        if c == open {
            b.open += 1;
        } else if c == close {
            b.close += 1;
        }
        b
    })
}

/// Checks only delimiter balance. Used after diff application, where a
/// keyword check would be meaningless.
pub fn check_balance(code: &str, settings: &ValidationSettings) -> EngineResult<()> {
    let braces = count(code, '{', '}');
    if braces.difference() > settings.brace_tolerance {
        return Err(EngineError::ValidationFailed(format!(
            "unbalanced braces: {} open, {} close",
            braces.open, braces.close
        )));
    }
    for (name, open, close) in [("parentheses", '(', ')'), ("brackets", '[', ']')] {
        let balance = count(code, open, close);
        if balance.difference() != 0 {
            return Err(EngineError::ValidationFailed(format!(
                "unbalanced {name}: {} open, {} close",
                balance.open, balance.close
            )));
        }
    }
    Ok(())
}

/// Validates a generated file body before it is accepted into a run.
pub fn validate_generated_code(code: &str, settings: &ValidationSettings) -> EngineResult<()> {
    if code.trim().is_empty() {
        return Err(EngineError::ValidationFailed(
            "generated content is empty".to_string(),
        ));
    }
    check_balance(code, settings)?;
    if !CODE_KEYWORD_REGEX.is_match(code) {
        return Err(EngineError::ValidationFailed(
            "generated content contains no recognizable code".to_string(),
        ));
    }
    Ok(())
}

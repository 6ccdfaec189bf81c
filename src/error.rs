//! # Engine Errors
//!
//! The failure taxonomy shared by every unit of the mutation engine. Each unit
//! (one operation, one diff block, one refactor step) catches these at its own
//! boundary and folds them into a structured result, so a variant never escapes
//! as an unhandled fault from the public API.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The input text is not a structurally valid source file.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A selector or operation has no matching location in the file.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// The operation payload is missing required fields or is otherwise invalid.
    #[error("Malformed operation: {0}")]
    MalformedOperation(String),

    #[error("Search block {block} not found in '{file}'")]
    SearchNotFound { file: String, block: usize },

    #[error("Search block {block} matches {occurrences} locations in '{file}'")]
    AmbiguousMatch {
        file: String,
        block: usize,
        occurrences: usize,
    },

    /// Generated content failed the balance/keyword gate.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Plan generation failed: {0}")]
    PlanGenerationFailed(String),

    #[error("Step {order} ({file}) failed: {reason}")]
    StepExecutionFailed {
        order: u32,
        file: String,
        reason: String,
    },

    #[error("Step {order} timed out after {limit:?}")]
    Timeout { order: u32, limit: Duration },

    #[error("Run cancelled before step {order}")]
    Cancelled { order: u32 },
}

/// A stable, serializable tag for each [`EngineError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ParseError,
    TargetNotFound,
    MalformedOperation,
    SearchNotFound,
    AmbiguousMatch,
    ValidationFailed,
    PlanGenerationFailed,
    StepExecutionFailed,
    Timeout,
    Cancelled,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Parse(_) => ErrorKind::ParseError,
            EngineError::TargetNotFound(_) => ErrorKind::TargetNotFound,
            EngineError::MalformedOperation(_) => ErrorKind::MalformedOperation,
            EngineError::SearchNotFound { .. } => ErrorKind::SearchNotFound,
            EngineError::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            EngineError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            EngineError::PlanGenerationFailed(_) => ErrorKind::PlanGenerationFailed,
            EngineError::StepExecutionFailed { .. } => ErrorKind::StepExecutionFailed,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::TargetNotFound => "TARGET_NOT_FOUND",
            ErrorKind::MalformedOperation => "MALFORMED_OPERATION",
            ErrorKind::SearchNotFound => "SEARCH_NOT_FOUND",
            ErrorKind::AmbiguousMatch => "AMBIGUOUS_MATCH",
            ErrorKind::ValidationFailed => "VALIDATION_FAILED",
            ErrorKind::PlanGenerationFailed => "PLAN_GENERATION_FAILED",
            ErrorKind::StepExecutionFailed => "STEP_EXECUTION_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_human_readable() {
        let err = EngineError::AmbiguousMatch {
            file: "src/App.tsx".to_string(),
            block: 2,
            occurrences: 3,
        };
        assert_eq!(
            err.to_string(),
            "Search block 2 matches 3 locations in 'src/App.tsx'"
        );
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
    }

    #[test]
    fn test_timeout_message_keeps_sub_second_limits() {
        let err = EngineError::Timeout {
            order: 1,
            limit: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Step 1 timed out after 250ms");
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn test_kind_serializes_in_screaming_case() {
        let json = serde_json::to_string(&ErrorKind::TargetNotFound).unwrap();
        assert_eq!(json, "\"TARGET_NOT_FOUND\"");
        assert_eq!(json.trim_matches('"'), ErrorKind::TargetNotFound.to_string());
    }
}

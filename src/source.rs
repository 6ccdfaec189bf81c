//! # Source Files
//!
//! A `SourceFile` is the caller-owned unit every engine entry point consumes and
//! returns. The engine never mutates one in place: each edit produces a fresh
//! value that replaces the old one.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// The first 8 hex digits of the content's SHA-1, used as a version tag in
/// reports.
pub(crate) fn short_hash(content: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..8].to_string()
}

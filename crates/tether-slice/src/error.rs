//! Error types for tether-slice

use tether_core::{ActionKind, KeyPath};
use thiserror::Error;

/// Slice definition and lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SliceError {
    /// The top of a key or action tree is not a branch
    #[error("{section} root must be a branch")]
    RootNotBranch { section: &'static str },

    /// A branch has no children
    #[error("branch '{path}' is empty")]
    EmptyBranch { path: KeyPath },

    /// A child name is empty
    #[error("empty segment under '{parent}'")]
    EmptySegment { parent: KeyPath },

    /// A child name contains the path separator
    #[error("segment '{segment}' under '{parent}' must not contain '/'")]
    InvalidSegment { parent: KeyPath, segment: String },

    /// Nothing is defined at this path
    #[error("no node at '{path}'")]
    UnknownPath { path: KeyPath },

    /// The node at this path has a different shape than requested
    #[error("'{path}' is a {found}, expected a {expected}")]
    UnexpectedNode {
        path: KeyPath,
        expected: &'static str,
        found: &'static str,
    },

    /// The key's initial value has a different type than requested
    #[error("key '{path}' holds {found}, requested {expected}")]
    KeyTypeMismatch {
        path: KeyPath,
        expected: &'static str,
        found: &'static str,
    },

    /// No handler is defined for this action path
    #[error("no action '{kind}' in slice")]
    UnknownAction { kind: ActionKind },

    /// The action's handler expects a different payload type
    #[error("action '{kind}' takes {found}, requested {expected}")]
    PayloadTypeMismatch {
        kind: ActionKind,
        expected: &'static str,
        found: &'static str,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SliceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SliceError::KeyTypeMismatch {
            path: KeyPath::new("todo/text"),
            expected: "u32",
            found: "alloc::string::String",
        };
        assert_eq!(
            err.to_string(),
            "key 'todo/text' holds alloc::string::String, requested u32"
        );
    }
}

//! ID validation errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("ID cannot be empty")]
    Empty,

    /// Node IDs end up inside store keys, so `:` and whitespace are refused.
    #[error("node ID '{id}' contains forbidden character {ch:?}")]
    InvalidCharacter { id: String, ch: char },

    #[error("expected '{expected}_' prefix, found '{actual}_'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    #[error("ID has no '_' between prefix and ULID")]
    MissingSeparator,

    #[error("malformed ULID: {0}")]
    InvalidUlid(String),
}

impl IdError {
    /// True when a prefixed ID carried the wrong type tag.
    pub fn is_prefix_error(&self) -> bool {
        matches!(self, IdError::InvalidPrefix { .. })
    }
}

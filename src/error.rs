//! Centralized error types for pgo2mbox.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the pgo2mbox library.
///
/// Errors raised while opening the archive or loading its index stop the
/// whole run. Errors raised while a group is converted only abort that group.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The source archive does not exist.
    #[error("Archive file not found: {0}")]
    FileNotFound(PathBuf),

    /// The SQLite layer reported an error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A required row of the `options` table is missing.
    #[error("Archive has no '{0}' option; is this an offline group archive?")]
    MissingOption(String),

    /// A table the conversion cannot do without is empty.
    #[error("Archive table '{0}' is empty")]
    EmptyArchive(&'static str),

    /// The configuration is invalid or self-contradictory.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The output mailbox is locked, most likely by a crashed earlier run.
    #[error(
        "Cannot lock '{path}': lock file '{lock}' already exists. \
         If a previous conversion crashed, delete the lock file and retry"
    )]
    Locked { path: PathBuf, lock: PathBuf },

    /// Re-fetching a message did not return exactly one row.
    #[error("Group '{group}': message id {message_id} returned {rows} rows, expected exactly 1")]
    Inconsistent {
        group: String,
        message_id: i64,
        rows: usize,
    },

    /// A message references a person that is not in the archive.
    #[error("Group '{group}': message #{number} references unknown person {person}")]
    UnknownAuthor {
        group: String,
        number: i64,
        person: i64,
    },

    /// A message could not be serialized.
    #[error("Group '{group}': cannot compose message #{number}: {source}")]
    Compose {
        group: String,
        number: i64,
        source: std::io::Error,
    },

    /// The on-disk size of the active mailbox could not be determined.
    #[error("Cannot determine size of '{path}': {source}")]
    OutputSize {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a free-text header value could not be encoded.
///
/// Never fatal: the message builder logs it and substitutes a
/// deterministic fallback value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The stored text is not valid UTF-8.
    #[error("text is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    /// The text holds a control character that has no place in a header.
    #[error("text contains control character U+{:04X}", codepoint(.0))]
    ControlCharacter(char),
}

fn codepoint(c: &char) -> u32 {
    u32::from(*c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_message_is_actionable() {
        let err = ConvertError::Locked {
            path: PathBuf::from("Test.mbox"),
            lock: PathBuf::from("Test.mbox.lock"),
        };
        let text = err.to_string();
        assert!(text.contains("Test.mbox.lock"));
        assert!(text.contains("delete the lock file"));
    }

    #[test]
    fn test_control_character_display() {
        let err = EncodeError::ControlCharacter('\u{7}');
        assert_eq!(err.to_string(), "text contains control character U+0007");
    }
}

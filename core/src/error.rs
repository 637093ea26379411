use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure the engine can report. Each variant maps to one taxonomy kind (see [`LexisError::kind`]).
#[derive(Error, Debug)]
pub enum LexisError {
    #[error("cannot decode {source_name} as UTF-8 text (invalid byte at offset {offset})")]
    Decoding { source_name: String, offset: usize },

    #[error("cannot read document {path}: {source}")]
    DocumentRead {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("document {0} is already indexed")]
    DuplicateDocument(String),

    #[error("no index found at {0}")]
    IndexNotFound(PathBuf),

    #[error("index at {0} is locked by another writer")]
    IndexLocked(PathBuf),

    #[error("query is empty")]
    EmptyQuery,

    #[error("{message} at position {position}: {fragment:?}")]
    QuerySyntax {
        message: String,
        fragment: String,
        position: usize,
    },

    #[error("corrupt index file {path}: {reason}")]
    StorageCorruption { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, LexisError>;

impl LexisError {
    /// Stable name of the error kind, suitable for user-facing output and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            LexisError::Decoding { .. } => "DecodingError",
            LexisError::DocumentRead { .. } => "DocumentReadError",
            LexisError::DuplicateDocument(_) => "DuplicateDocument",
            LexisError::IndexNotFound(_) => "IndexNotFoundError",
            LexisError::IndexLocked(_) => "IndexLockedError",
            LexisError::EmptyQuery => "EmptyQueryError",
            LexisError::QuerySyntax { .. } => "QuerySyntaxError",
            LexisError::StorageCorruption { .. } => "StorageCorruptionError",
            LexisError::Io(_) => "IoError",
        }
    }

    pub(crate) fn syntax(message: impl Into<String>, fragment: impl Into<String>, position: usize) -> Self {
        LexisError::QuerySyntax { message: message.into(), fragment: fragment.into(), position }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LexisError::StorageCorruption { path: path.into(), reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        assert_eq!(LexisError::EmptyQuery.kind(), "EmptyQueryError");
        assert_eq!(LexisError::IndexLocked(PathBuf::from("idx")).kind(), "IndexLockedError");
        let err = LexisError::syntax("unterminated phrase", "\"gato", 4);
        assert_eq!(err.kind(), "QuerySyntaxError");
        assert_eq!(err.to_string(), "unterminated phrase at position 4: \"\\\"gato\"");
    }
}

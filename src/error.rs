use thiserror::Error;

/// Failures surfaced by the reflow core.
///
/// Stream exhaustion and unresolvable links are not errors: the first is a
/// normal end-of-item signal, the second becomes a transient status message.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The token source for a document item could not be opened.
    #[error("cannot open {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    #[error("book has no readable items")]
    NoItems,

    #[error("item {index} is out of range ({count} items)")]
    ItemOutOfRange { index: usize, count: usize },
}

impl ReaderError {
    pub fn unavailable(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;

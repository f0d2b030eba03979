use std::io;
use thiserror::Error;

/// Failures visible to callers of [`crate::Document`].
///
/// Malformed Markdown never produces an error; it degrades to literal text.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The document has already been rendered and no longer accepts input.
    #[error("document has already been processed; it no longer accepts input")]
    AlreadyProcessed,

    /// Reading the input stream or writing the output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

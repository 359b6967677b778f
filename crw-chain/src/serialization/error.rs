use std::io;

use thiserror::Error;

/// A serialization error.
///
/// Parse failures carry the byte offset (relative to the start of the
/// structure being decoded) at which the problem was detected, via
/// [`OffsetReader`](super::OffsetReader) -- enough to report exactly where a
/// peer's malformed message went wrong instead of just "bad data".
#[derive(Error, Debug)]
pub enum SerializationError {
    /// An io error that prevented deserialization
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The data to be deserialized was malformed.
    #[error("parse error at offset {offset}: {message}")]
    Parse { message: &'static str, offset: u64 },
}

impl SerializationError {
    /// Builds a parse error with no offset information (offset `0`).
    ///
    /// Most call sites don't have an [`OffsetReader`](super::OffsetReader) in
    /// scope; top-level entry points that do should use
    /// [`OffsetReader::parse_error`](super::OffsetReader::parse_error) instead.
    pub fn parse(message: &'static str) -> Self {
        SerializationError::Parse { message, offset: 0 }
    }

    /// The byte offset at which parsing failed, if known.
    pub fn offset(&self) -> Option<u64> {
        match self {
            SerializationError::Parse { offset, .. } => Some(*offset),
            SerializationError::Io(_) => None,
        }
    }

    /// Attaches `offset` to this error if it doesn't already carry one.
    pub fn at_offset(self, offset: u64) -> Self {
        match self {
            SerializationError::Parse { message, .. } => {
                SerializationError::Parse { message, offset }
            }
            other => other,
        }
    }
}

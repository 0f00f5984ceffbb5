//! Featurizer error types

use thiserror::Error;

use crate::element::ElementType;

/// Errors raised while decoding a serialized transform archive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// Archive ended before a field could be read
    #[error("unexpected end of archive: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    /// Archive was written by an incompatible format version
    #[error("unsupported archive version {major}.{minor}")]
    VersionMismatch { major: u16, minor: u16 },

    /// Element tag byte does not name a supported element type
    #[error("unknown element tag: {0}")]
    UnknownElementTag(u8),

    /// A field holds a value outside its allowed range
    #[error("invalid archive field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Bytes left over after the last field
    #[error("{0} trailing bytes after archive payload")]
    TrailingBytes(usize),
}

/// Errors that can occur while building or applying a transform
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeaturizerError {
    /// Archive bytes could not be decoded
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Input width disagrees with the transform's expected width
    #[error("dimension mismatch: transform expects {expected} input columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Transform parameters are inconsistent or non-finite
    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    /// Execute/flush contract broken by a transform or its caller
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Value not representable in the requested element type
    #[error("value {value} does not fit in {target}")]
    Conversion { value: f64, target: ElementType },
}

/// Result type for featurizer operations
pub type Result<T> = std::result::Result<T, FeaturizerError>;

//! Kernel error types

use featurizer_core::FeaturizerError;
use thiserror::Error;

use crate::tensor::DataType;

/// Errors surfaced by a kernel invocation or by the frame hosting it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Failure inside the featurizer library (archive, protocol, math)
    #[error("featurizer error: {0}")]
    Featurizer(#[from] FeaturizerError),

    /// Input column count disagrees with the transform
    #[error("dimension mismatch: expected {expected} input columns, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Malformed call: wrong arity, rank, or shape
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Tensor element type outside the operator's type constraint
    #[error("{op}: type constraint '{constraint}' does not admit {data_type}")]
    UnsupportedType {
        op: String,
        constraint: String,
        data_type: DataType,
    },

    /// Output buffer could not be reserved
    #[error("failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },

    /// No kernel registered under the requested name and domain
    #[error("no kernel registered for {domain}::{name}")]
    KernelNotFound { name: String, domain: String },

    /// Kernel wrote an output the host did not expect, or skipped one
    #[error("output error: {0}")]
    Output(String),
}

impl KernelError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;

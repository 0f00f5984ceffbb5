//! Numeric element types accepted by featurizer transforms.

use std::fmt;

use ndarray::LinalgScalar;
use serde::{Deserialize, Serialize};

use crate::error::{FeaturizerError, Result};

/// Floating-point widths a transform can be stored in and applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    #[serde(rename = "f32")]
    Float32,
    #[serde(rename = "f64")]
    Float64,
}

impl ElementType {
    /// Tag byte used in the archive layout.
    pub fn tag(self) -> u8 {
        match self {
            ElementType::Float32 => 1,
            ElementType::Float64 => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ElementType::Float32),
            2 => Some(ElementType::Float64),
            _ => None,
        }
    }

    /// Width of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Float32 => write!(f, "f32"),
            ElementType::Float64 => write!(f, "f64"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// A floating-point element a transform can be specialized for.
///
/// Implemented for `f32` and `f64` only. Callers pick the concrete type once
/// and every transform operation below that point is monomorphized.
pub trait Element:
    sealed::Sealed + LinalgScalar + PartialOrd + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    const ELEMENT_TYPE: ElementType;

    /// Narrow or widen an `f64`, failing when a finite value overflows.
    fn from_f64(value: f64) -> Result<Self>;

    fn to_f64(self) -> f64;

    fn is_finite(self) -> bool;

    /// Decode from exactly `ELEMENT_TYPE.size()` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;

    fn write_le(self, out: &mut Vec<u8>);
}

impl Element for f32 {
    const ELEMENT_TYPE: ElementType = ElementType::Float32;

    fn from_f64(value: f64) -> Result<Self> {
        let narrowed = value as f32;
        if value.is_finite() && !narrowed.is_finite() {
            return Err(FeaturizerError::Conversion {
                value,
                target: ElementType::Float32,
            });
        }
        Ok(narrowed)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }

    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        f32::from_le_bytes(raw)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Element for f64 {
    const ELEMENT_TYPE: ElementType = ElementType::Float64;

    fn from_f64(value: f64) -> Result<Self> {
        Ok(value)
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }

    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        f64::from_le_bytes(raw)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_names() {
        assert_eq!(serde_json::to_string(&ElementType::Float32).unwrap(), "\"f32\"");
        assert_eq!(serde_json::to_string(&ElementType::Float64).unwrap(), "\"f64\"");
        let parsed: ElementType = serde_json::from_str("\"f64\"").unwrap();
        assert_eq!(parsed, ElementType::Float64);
        assert!(serde_json::from_str::<ElementType>("\"Float32\"").is_err());
    }

    #[test]
    fn test_tag_round_trip() {
        for ty in [ElementType::Float32, ElementType::Float64] {
            assert_eq!(ElementType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(ElementType::from_tag(0), None);
        assert_eq!(ElementType::from_tag(3), None);
    }

    #[test]
    fn test_narrowing_overflow_is_rejected() {
        assert!(f32::from_f64(1e300).is_err());
        assert_eq!(f32::from_f64(0.5).unwrap(), 0.5f32);
        // Non-finite inputs are passed through, finiteness is checked by the caller
        assert!(f32::from_f64(f64::INFINITY).unwrap().is_infinite());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ElementType::Float32.to_string(), "f32");
        assert_eq!(ElementType::Float64.to_string(), "f64");
    }
}

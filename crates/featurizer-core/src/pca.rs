//! PCA projection transformer.
//!
//! Holds the component matrix of a previously fitted PCA (one row per output
//! dimension) and an optional centering vector. Applying the transform maps
//! each input row `x` to `(x - mean) · eigenvectorsᵀ`.
//!
//! # Archive layout
//!
//! ```text
//! u16 major | u16 minor | u8 element tag | u64 rows (P) | u64 cols (D)
//! P*D elements, row-major
//! u8 has_mean | D elements (only when has_mean == 1)
//! ```

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::archive::{Archive, ArchiveWriter};
use crate::element::{Element, ElementType};
use crate::error::{ArchiveError, FeaturizerError, Result};
use crate::transformer::{Callback, Transformer};

pub const ARCHIVE_MAJOR_VERSION: u16 = 1;
pub const ARCHIVE_MINOR_VERSION: u16 = 0;

/// Immutable PCA projection state.
#[derive(Debug, Clone, PartialEq)]
pub struct PcaTransformer<T: Element> {
    /// Shape `[P, D]`
    eigenvectors: Array2<T>,
    /// Shape `[D]`
    mean: Option<Array1<T>>,
}

impl<T: Element> PcaTransformer<T> {
    /// Build a transformer from known components.
    pub fn new(eigenvectors: Array2<T>, mean: Option<Array1<T>>) -> Result<Self> {
        let (rows, cols) = eigenvectors.dim();
        if rows == 0 || cols == 0 {
            return Err(FeaturizerError::InvalidTransform(format!(
                "eigenvector matrix must be non-empty, got {}x{}",
                rows, cols
            )));
        }
        if let Some(ref mean) = mean {
            if mean.len() != cols {
                return Err(FeaturizerError::InvalidTransform(format!(
                    "mean has {} entries but eigenvectors have {} columns",
                    mean.len(),
                    cols
                )));
            }
            if mean.iter().any(|v| !v.is_finite()) {
                return Err(FeaturizerError::InvalidTransform(
                    "mean contains non-finite values".to_string(),
                ));
            }
        }
        if eigenvectors.iter().any(|v| !v.is_finite()) {
            return Err(FeaturizerError::InvalidTransform(
                "eigenvectors contain non-finite values".to_string(),
            ));
        }

        Ok(Self { eigenvectors, mean })
    }

    /// Decode a transformer from an archive positioned at its first field.
    pub fn from_archive(archive: &mut Archive<'_>) -> Result<Self> {
        let header = read_header(archive)?;

        let values = archive.deserialize_elements::<T>(
            header.element_type,
            header.output_dims * header.input_dims,
            "eigenvectors",
        )?;
        let eigenvectors = Array2::from_shape_vec((header.output_dims, header.input_dims), values)
            .map_err(|e| FeaturizerError::InvalidTransform(e.to_string()))?;

        let mean = match read_mean_flag(archive)? {
            false => None,
            true => Some(Array1::from_vec(archive.deserialize_elements::<T>(
                header.element_type,
                header.input_dims,
                "mean",
            )?)),
        };

        Self::new(eigenvectors, mean)
    }

    /// Decode a transformer from a complete archive buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive = Archive::new(bytes);
        let transformer = Self::from_archive(&mut archive)?;
        archive.finish()?;

        debug!(
            "Loaded PCA transformer {}x{} ({} bytes, centered: {})",
            transformer.output_dims(),
            transformer.input_dims(),
            bytes.len(),
            transformer.is_centered()
        );
        Ok(transformer)
    }

    /// Append this transformer to `writer`, storing values as `stored`.
    pub fn serialize(&self, writer: &mut ArchiveWriter, stored: ElementType) -> Result<()> {
        writer
            .serialize_u16(ARCHIVE_MAJOR_VERSION)
            .serialize_u16(ARCHIVE_MINOR_VERSION)
            .serialize_element_type(stored)
            .serialize_u64(self.output_dims() as u64)
            .serialize_u64(self.input_dims() as u64);
        writer.serialize_elements(stored, self.eigenvectors.iter().copied())?;

        match self.mean {
            Some(ref mean) => {
                writer.serialize_u8(1);
                writer.serialize_elements(stored, mean.iter().copied())?;
            }
            None => {
                writer.serialize_u8(0);
            }
        }
        Ok(())
    }

    /// Encode this transformer as a standalone archive.
    pub fn to_bytes(&self, stored: ElementType) -> Result<Vec<u8>> {
        let mut writer = ArchiveWriter::new();
        self.serialize(&mut writer, stored)?;
        Ok(writer.commit())
    }

    /// Number of output columns (rows of the eigenvector matrix).
    pub fn output_dims(&self) -> usize {
        self.eigenvectors.nrows()
    }

    /// Number of input columns the transform expects.
    pub fn input_dims(&self) -> usize {
        self.eigenvectors.ncols()
    }

    pub fn is_centered(&self) -> bool {
        self.mean.is_some()
    }

    pub fn eigenvectors(&self) -> &Array2<T> {
        &self.eigenvectors
    }

    pub fn mean(&self) -> Option<&Array1<T>> {
        self.mean.as_ref()
    }

    /// Project a batch of rows. Input shape `[N, D]`, output shape `[N, P]`.
    pub fn transform(&self, input: ArrayView2<'_, T>) -> Result<Array2<T>> {
        let (rows, cols) = input.dim();
        if cols != self.input_dims() {
            return Err(FeaturizerError::DimensionMismatch {
                expected: self.input_dims(),
                actual: cols,
            });
        }
        if rows == 0 {
            return Ok(Array2::zeros((0, self.output_dims())));
        }

        let projected = match self.mean {
            Some(ref mean) => {
                let centered = &input - mean;
                centered.dot(&self.eigenvectors.t())
            }
            None => input.dot(&self.eigenvectors.t()),
        };
        Ok(projected)
    }

    /// Start a single-pass execute/flush session over this transformer.
    pub fn session(&self) -> PcaSession<'_, T> {
        PcaSession {
            transformer: self,
            flushed: false,
        }
    }
}

/// Protocol binding of a shared [`PcaTransformer`].
///
/// The transformer itself is immutable and may be shared across threads; a
/// session carries the per-call protocol state.
#[derive(Debug)]
pub struct PcaSession<'t, T: Element> {
    transformer: &'t PcaTransformer<T>,
    flushed: bool,
}

impl<'t, T: Element> PcaSession<'t, T> {
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }
}

impl<'a, 't, T: Element> Transformer<ArrayView2<'a, T>> for PcaSession<'t, T> {
    type Output = Array2<T>;

    fn execute(
        &mut self,
        input: ArrayView2<'a, T>,
        callback: &mut Callback<'_, Array2<T>>,
    ) -> Result<()> {
        if self.flushed {
            return Err(FeaturizerError::Protocol(
                "execute called after flush".to_string(),
            ));
        }
        let projected = self.transformer.transform(input)?;
        callback(projected)
    }

    fn flush(&mut self, _callback: &mut Callback<'_, Array2<T>>) -> Result<()> {
        if self.flushed {
            return Err(FeaturizerError::Protocol("flush called twice".to_string()));
        }
        // Batch projection buffers nothing
        self.flushed = true;
        Ok(())
    }
}

/// Metadata read from an archive without materializing its matrices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    pub major_version: u16,
    pub minor_version: u16,
    pub element_type: ElementType,
    pub output_dims: usize,
    pub input_dims: usize,
    pub centered: bool,
    pub size_bytes: usize,
}

/// Read and validate archive metadata.
pub fn inspect(bytes: &[u8]) -> Result<ArchiveInfo> {
    let mut archive = Archive::new(bytes);
    let header = read_header(&mut archive)?;
    let width = header.element_type.size();

    archive.skip(header.output_dims * header.input_dims * width)?;
    let centered = read_mean_flag(&mut archive)?;
    if centered {
        archive.skip(header.input_dims * width)?;
    }
    archive.finish()?;

    Ok(ArchiveInfo {
        major_version: header.major,
        minor_version: header.minor,
        element_type: header.element_type,
        output_dims: header.output_dims,
        input_dims: header.input_dims,
        centered,
        size_bytes: bytes.len(),
    })
}

struct Header {
    major: u16,
    minor: u16,
    element_type: ElementType,
    output_dims: usize,
    input_dims: usize,
}

fn read_header(archive: &mut Archive<'_>) -> Result<Header> {
    let major = archive.deserialize_u16()?;
    let minor = archive.deserialize_u16()?;
    if major != ARCHIVE_MAJOR_VERSION || minor > ARCHIVE_MINOR_VERSION {
        return Err(ArchiveError::VersionMismatch { major, minor }.into());
    }

    let element_type = archive.deserialize_element_type()?;
    let output_dims = archive.deserialize_len("rows")?;
    let input_dims = archive.deserialize_len("cols")?;
    if output_dims == 0 || input_dims == 0 {
        return Err(ArchiveError::InvalidField {
            field: "shape",
            reason: format!("empty eigenvector matrix {}x{}", output_dims, input_dims),
        }
        .into());
    }

    // Reject shapes whose byte size cannot exist before anything is allocated
    output_dims
        .checked_mul(input_dims)
        .and_then(|n| n.checked_mul(element_type.size()))
        .ok_or_else(|| ArchiveError::InvalidField {
            field: "shape",
            reason: format!("{}x{} overflows", output_dims, input_dims),
        })?;

    Ok(Header {
        major,
        minor,
        element_type,
        output_dims,
        input_dims,
    })
}

fn read_mean_flag(archive: &mut Archive<'_>) -> Result<bool> {
    match archive.deserialize_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ArchiveError::InvalidField {
            field: "has_mean",
            reason: format!("expected 0 or 1, got {}", other),
        }
        .into()),
    }
}

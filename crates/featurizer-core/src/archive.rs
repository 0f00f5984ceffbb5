//! Binary archive codec for transform state.
//!
//! Archives are flat little-endian byte sequences. A transform writes its
//! fields in a fixed order through [`ArchiveWriter`] and reads them back in
//! the same order through [`Archive`]. Every read is bounds-checked so a
//! truncated or corrupted buffer surfaces as an [`ArchiveError`] instead of a
//! panic, and [`Archive::finish`] rejects bytes left over after the payload.

use crate::element::{Element, ElementType};
use crate::error::{ArchiveError, FeaturizerError, Result};

/// Read cursor over a borrowed archive buffer.
#[derive(Debug)]
pub struct Archive<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Archive<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> std::result::Result<&'a [u8], ArchiveError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ArchiveError::UnexpectedEnd { needed, remaining });
        }
        let start = self.position;
        self.position += needed;
        Ok(&self.data[start..self.position])
    }

    pub fn deserialize_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn deserialize_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn deserialize_u64(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a length field and convert it to `usize`.
    pub fn deserialize_len(&mut self, field: &'static str) -> Result<usize> {
        let value = self.deserialize_u64()?;
        usize::try_from(value).map_err(|_| {
            FeaturizerError::from(ArchiveError::InvalidField {
                field,
                reason: format!("{} does not fit in usize", value),
            })
        })
    }

    pub fn deserialize_element_type(&mut self) -> Result<ElementType> {
        let tag = self.deserialize_u8()?;
        ElementType::from_tag(tag)
            .ok_or_else(|| FeaturizerError::from(ArchiveError::UnknownElementTag(tag)))
    }

    /// Read `count` elements stored as `stored` and convert them to `T`.
    ///
    /// The byte length is checked against the remaining buffer before any
    /// allocation, so a corrupted count cannot trigger a huge reservation.
    pub fn deserialize_elements<T: Element>(
        &mut self,
        stored: ElementType,
        count: usize,
        field: &'static str,
    ) -> Result<Vec<T>> {
        let width = stored.size();
        let needed = count
            .checked_mul(width)
            .ok_or_else(|| ArchiveError::InvalidField {
                field,
                reason: format!("{} elements overflow the address space", count),
            })?;
        let bytes = self.take(needed)?;

        let mut values = Vec::with_capacity(count);
        for chunk in bytes.chunks_exact(width) {
            let value = match stored {
                ElementType::Float32 => T::from_f64(f32::read_le(chunk).to_f64())?,
                ElementType::Float64 => T::from_f64(f64::read_le(chunk))?,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Advance past `count` bytes without decoding them.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count)?;
        Ok(())
    }

    /// Assert the whole buffer was consumed.
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ArchiveError::TrailingBytes(n).into()),
        }
    }
}

/// Append-only archive builder.
#[derive(Debug, Default)]
pub struct ArchiveWriter {
    buffer: Vec<u8>,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn serialize_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn serialize_u16(&mut self, value: u16) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn serialize_u64(&mut self, value: u64) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn serialize_element_type(&mut self, element_type: ElementType) -> &mut Self {
        self.serialize_u8(element_type.tag())
    }

    /// Write `values` converted to the `stored` width.
    pub fn serialize_elements<T: Element>(
        &mut self,
        stored: ElementType,
        values: impl IntoIterator<Item = T>,
    ) -> Result<&mut Self> {
        for value in values {
            match stored {
                ElementType::Float32 => f32::from_f64(value.to_f64())?.write_le(&mut self.buffer),
                ElementType::Float64 => value.to_f64().write_le(&mut self.buffer),
            }
        }
        Ok(self)
    }

    /// Consume the writer and return the archive bytes.
    pub fn commit(self) -> Vec<u8> {
        self.buffer
    }
}

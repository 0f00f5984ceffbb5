//! Host tensor types
//!
//! Tensors own a flat row-major buffer plus a shape. Element storage is a
//! closed tagged union over the handful of types operators in this crate
//! accept; typed access goes through [`TensorElement`], so a kernel resolves
//! the tag once and works on plain slices afterwards.

use std::fmt;

use featurizer_core::ElementType;
use ndarray::{ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Element type tag carried by every tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    UInt8,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DataType::UInt8 => 1,
            DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::UInt8 => write!(f, "tensor(uint8)"),
            DataType::Float32 => write!(f, "tensor(float)"),
            DataType::Float64 => write!(f, "tensor(double)"),
        }
    }
}

impl From<ElementType> for DataType {
    fn from(element_type: ElementType) -> Self {
        match element_type {
            ElementType::Float32 => DataType::Float32,
            ElementType::Float64 => DataType::Float64,
        }
    }
}

/// Tensor dimensions, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total element count, `None` when it overflows `usize`.
    pub fn size(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

/// Typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    UInt8(Vec<u8>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl TensorData {
    pub fn data_type(&self) -> DataType {
        match self {
            TensorData::UInt8(_) => DataType::UInt8,
            TensorData::Float32(_) => DataType::Float32,
            TensorData::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::UInt8(v) => v.len(),
            TensorData::Float32(v) => v.len(),
            TensorData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Rust element type backing one [`DataType`] variant.
pub trait TensorElement: sealed::Sealed + Copy + Default + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    fn slice(data: &TensorData) -> Option<&[Self]>;

    fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]>;

    fn wrap(values: Vec<Self>) -> TensorData;

    fn take(data: TensorData) -> Option<Vec<Self>>;
}

macro_rules! impl_tensor_element {
    ($ty:ty, $variant:ident) => {
        impl TensorElement for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn slice(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(data: &mut TensorData) -> Option<&mut [Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }

            fn take(data: TensorData) -> Option<Vec<Self>> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_tensor_element!(u8, UInt8);
impl_tensor_element!(f32, Float32);
impl_tensor_element!(f64, Float64);

/// Owned tensor: shape plus flat row-major storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: TensorShape,
    data: TensorData,
}

impl Tensor {
    /// Wrap `values` as a tensor of `shape`.
    pub fn from_vec<T: TensorElement>(shape: impl Into<TensorShape>, values: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape
            .size()
            .ok_or_else(|| KernelError::invalid_argument(format!("shape {} is too large", shape)))?;
        if expected != values.len() {
            return Err(KernelError::invalid_argument(format!(
                "shape {} needs {} elements, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self {
            shape,
            data: T::wrap(values),
        })
    }

    /// One-dimensional byte tensor, the form archives travel in.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self {
            shape: TensorShape::new(vec![bytes.len()]),
            data: TensorData::UInt8(bytes),
        }
    }

    pub(crate) fn from_parts(shape: TensorShape, data: TensorData) -> Self {
        Self { shape, data }
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn storage(&self) -> &TensorData {
        &self.data
    }

    /// Borrow the elements as `T`, failing when the tag differs.
    pub fn data<T: TensorElement>(&self) -> Result<&[T]> {
        T::slice(&self.data).ok_or_else(|| self.type_error::<T>())
    }

    pub fn data_mut<T: TensorElement>(&mut self) -> Result<&mut [T]> {
        let data_type = self.data_type();
        T::slice_mut(&mut self.data).ok_or_else(|| {
            KernelError::invalid_argument(format!(
                "tensor holds {}, requested {}",
                data_type,
                T::DATA_TYPE
            ))
        })
    }

    /// View a rank-2 tensor as a matrix.
    pub fn view2<T: TensorElement>(&self) -> Result<ArrayView2<'_, T>> {
        let (rows, cols) = self.matrix_dims()?;
        let data = self.data::<T>()?;
        ArrayView2::from_shape((rows, cols), data)
            .map_err(|e| KernelError::invalid_argument(e.to_string()))
    }

    pub fn view2_mut<T: TensorElement>(&mut self) -> Result<ArrayViewMut2<'_, T>> {
        let (rows, cols) = self.matrix_dims()?;
        let data = self.data_mut::<T>()?;
        ArrayViewMut2::from_shape((rows, cols), data)
            .map_err(|e| KernelError::invalid_argument(e.to_string()))
    }

    /// Consume the tensor and return its elements as `T`.
    pub fn into_vec<T: TensorElement>(self) -> Result<Vec<T>> {
        let data_type = self.data_type();
        let shape = self.shape;
        T::take(self.data).ok_or_else(|| {
            KernelError::invalid_argument(format!(
                "tensor {} holds {}, requested {}",
                shape,
                data_type,
                T::DATA_TYPE
            ))
        })
    }

    fn matrix_dims(&self) -> Result<(usize, usize)> {
        match self.shape.dims() {
            [rows, cols] => Ok((*rows, *cols)),
            dims => Err(KernelError::invalid_argument(format!(
                "expected a rank-2 tensor, got shape {:?}",
                dims
            ))),
        }
    }

    fn type_error<T: TensorElement>(&self) -> KernelError {
        KernelError::invalid_argument(format!(
            "tensor holds {}, requested {}",
            self.data_type(),
            T::DATA_TYPE
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_size() {
        assert_eq!(TensorShape::from([3, 4]).size(), Some(12));
        assert_eq!(TensorShape::from([0, 4]).size(), Some(0));
        assert_eq!(TensorShape::new(Vec::<usize>::new()).size(), Some(1));
        assert_eq!(TensorShape::from([usize::MAX, 2]).size(), None);
    }

    #[test]
    fn test_from_vec_checks_element_count() {
        assert!(Tensor::from_vec([2, 2], vec![1.0f32, 2.0, 3.0, 4.0]).is_ok());
        assert!(Tensor::from_vec([2, 2], vec![1.0f32, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_typed_access_checks_tag() {
        let tensor = Tensor::from_vec([1, 2], vec![1.0f64, 2.0]).unwrap();
        assert_eq!(tensor.data_type(), DataType::Float64);
        assert_eq!(tensor.data::<f64>().unwrap(), &[1.0, 2.0]);
        assert!(tensor.data::<f32>().is_err());
    }

    #[test]
    fn test_view2_requires_rank_two() {
        let matrix = Tensor::from_vec([2, 3], vec![0.0f32; 6]).unwrap();
        assert_eq!(matrix.view2::<f32>().unwrap().dim(), (2, 3));

        let flat = Tensor::from_vec([6], vec![0.0f32; 6]).unwrap();
        assert!(matches!(
            flat.view2::<f32>(),
            Err(KernelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_byte_tensor() {
        let tensor = Tensor::from_bytes(vec![1u8, 2, 3]);
        assert_eq!(tensor.shape().dims(), &[3]);
        assert_eq!(tensor.data_type(), DataType::UInt8);
        assert_eq!(tensor.into_vec::<u8>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_display_matches_type_strings() {
        assert_eq!(DataType::Float32.to_string(), "tensor(float)");
        assert_eq!(DataType::from(ElementType::Float64), DataType::Float64);
    }
}

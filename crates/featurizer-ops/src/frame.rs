//! Single-node execution frame.
//!
//! The frame owns a node's feeds and fetches plus the allocator outputs are
//! carved from. [`ExecutionFrame::run`] hands a kernel an
//! [`OpKernelContext`] whose outputs are staged privately; they replace the
//! frame's fetches only when `compute` succeeds, so a failed call never
//! leaves a half-written tensor behind.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{KernelError, Result};
use crate::kernel_def::OpKernel;
use crate::tensor::{DataType, Tensor, TensorData, TensorElement, TensorShape};

/// Source of output buffers.
pub trait Allocator: Send + Sync {
    /// Allocate a zero-initialized tensor of `shape` and `data_type`.
    fn allocate(&self, shape: &TensorShape, data_type: DataType) -> Result<Tensor>;
}

/// Heap allocator with fallible reservation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuAllocator;

impl CpuAllocator {
    /// Byte size of a `shape` x `data_type` buffer, rejecting overflow.
    pub fn byte_size(shape: &TensorShape, data_type: DataType) -> Result<usize> {
        let len = shape.size().ok_or_else(|| {
            KernelError::invalid_argument(format!("tensor shape {} is too large", shape))
        })?;
        len.checked_mul(data_type.size())
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or_else(|| KernelError::invalid_argument(format!("size overflow for shape {}", shape)))
    }
}

impl Allocator for CpuAllocator {
    fn allocate(&self, shape: &TensorShape, data_type: DataType) -> Result<Tensor> {
        let bytes = Self::byte_size(shape, data_type)?;
        let len = bytes / data_type.size();
        let data = match data_type {
            DataType::UInt8 => TensorData::UInt8(zeroed(len, bytes)?),
            DataType::Float32 => TensorData::Float32(zeroed(len, bytes)?),
            DataType::Float64 => TensorData::Float64(zeroed(len, bytes)?),
        };
        Ok(Tensor::from_parts(shape.clone(), data))
    }
}

fn zeroed<T: TensorElement>(len: usize, bytes: usize) -> Result<Vec<T>> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(len)
        .map_err(|_| KernelError::Allocation { bytes })?;
    values.resize(len, T::default());
    Ok(values)
}

/// Per-call view of a frame handed to [`OpKernel::compute`].
pub struct OpKernelContext<'f> {
    inputs: &'f [Tensor],
    outputs: Vec<Option<Tensor>>,
    allocator: &'f dyn Allocator,
}

impl<'f> OpKernelContext<'f> {
    pub fn new(inputs: &'f [Tensor], output_count: usize, allocator: &'f dyn Allocator) -> Self {
        Self {
            inputs,
            outputs: (0..output_count).map(|_| None).collect(),
            allocator,
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Borrow input `index`. The borrow is tied to the frame, not to the
    /// context, so inputs stay readable while outputs are being written.
    pub fn input(&self, index: usize) -> Result<&'f Tensor> {
        self.inputs.get(index).ok_or_else(|| {
            KernelError::invalid_argument(format!(
                "input {} requested but node has {} inputs",
                index,
                self.inputs.len()
            ))
        })
    }

    /// Allocate output `index` with the given shape and type.
    ///
    /// Each output can be allocated once per call.
    pub fn output(
        &mut self,
        index: usize,
        shape: TensorShape,
        data_type: DataType,
    ) -> Result<&mut Tensor> {
        let count = self.outputs.len();
        let slot = self.outputs.get_mut(index).ok_or_else(|| {
            KernelError::Output(format!(
                "output {} requested but node has {} outputs",
                index, count
            ))
        })?;
        if slot.is_some() {
            return Err(KernelError::Output(format!(
                "output {} allocated twice",
                index
            )));
        }

        let tensor = self.allocator.allocate(&shape, data_type)?;
        Ok(slot.insert(tensor))
    }

    /// Finish the call, requiring every output to have been produced.
    pub fn into_outputs(self) -> Result<Vec<Tensor>> {
        self.outputs
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    KernelError::Output(format!("kernel did not produce output {}", index))
                })
            })
            .collect()
    }
}

/// Feeds, fetches, and allocator for one node.
pub struct ExecutionFrame {
    feeds: Vec<Tensor>,
    fetches: Vec<Option<Tensor>>,
    allocator: Arc<dyn Allocator>,
}

impl ExecutionFrame {
    /// Frame over `feeds` with `output_count` fetch slots on the CPU allocator.
    pub fn new(feeds: Vec<Tensor>, output_count: usize) -> Self {
        Self::with_allocator(feeds, output_count, Arc::new(CpuAllocator))
    }

    pub fn with_allocator(
        feeds: Vec<Tensor>,
        output_count: usize,
        allocator: Arc<dyn Allocator>,
    ) -> Self {
        Self {
            feeds,
            fetches: (0..output_count).map(|_| None).collect(),
            allocator,
        }
    }

    pub fn feeds(&self) -> &[Tensor] {
        &self.feeds
    }

    /// Replace feed `index` between runs.
    pub fn set_feed(&mut self, index: usize, tensor: Tensor) -> Result<()> {
        let count = self.feeds.len();
        let slot = self.feeds.get_mut(index).ok_or_else(|| {
            KernelError::invalid_argument(format!("feed {} out of range ({} feeds)", index, count))
        })?;
        *slot = tensor;
        Ok(())
    }

    /// Run `kernel` against this frame's feeds.
    ///
    /// Fetches from a previous run are cleared first; on failure they stay
    /// empty.
    pub fn run(&mut self, kernel: &dyn OpKernel) -> Result<()> {
        for fetch in self.fetches.iter_mut() {
            *fetch = None;
        }

        let def = kernel.def();
        let mut ctx = OpKernelContext::new(&self.feeds, self.fetches.len(), self.allocator.as_ref());
        if let Err(e) = kernel.compute(&mut ctx) {
            warn!("{}::{} failed: {}", def.domain(), def.name(), e);
            return Err(e);
        }
        let outputs = ctx.into_outputs()?;

        for (fetch, output) in self.fetches.iter_mut().zip(outputs) {
            *fetch = Some(output);
        }
        debug!("{}::{} completed", def.domain(), def.name());
        Ok(())
    }

    pub fn fetch(&self, index: usize) -> Option<&Tensor> {
        self.fetches.get(index).and_then(|f| f.as_ref())
    }

    /// Move fetch `index` out of the frame.
    pub fn take_fetch(&mut self, index: usize) -> Option<Tensor> {
        self.fetches.get_mut(index).and_then(|f| f.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_def::{KernelDef, KernelDefBuilder};

    /// Copies input 0 to output 0, optionally failing after allocation.
    struct CopyKernel {
        def: KernelDef,
        fail_after_alloc: bool,
    }

    impl CopyKernel {
        fn new(fail_after_alloc: bool) -> Self {
            Self {
                def: KernelDefBuilder::new()
                    .set_name("Copy")
                    .type_constraint("T", [DataType::Float32])
                    .build(),
                fail_after_alloc,
            }
        }
    }

    impl OpKernel for CopyKernel {
        fn def(&self) -> &KernelDef {
            &self.def
        }

        fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
            let input = ctx.input(0)?;
            let output = ctx.output(0, input.shape().clone(), DataType::Float32)?;
            output.data_mut::<f32>()?.copy_from_slice(input.data::<f32>()?);
            if self.fail_after_alloc {
                return Err(KernelError::invalid_argument("forced failure"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_run_publishes_outputs() {
        let input = Tensor::from_vec([2], vec![1.0f32, 2.0]).unwrap();
        let mut frame = ExecutionFrame::new(vec![input.clone()], 1);
        frame.run(&CopyKernel::new(false)).unwrap();
        assert_eq!(frame.fetch(0), Some(&input));
    }

    #[test]
    fn test_failed_run_publishes_nothing() {
        let input = Tensor::from_vec([2], vec![1.0f32, 2.0]).unwrap();
        let mut frame = ExecutionFrame::new(vec![input], 1);
        frame.run(&CopyKernel::new(false)).unwrap();
        assert!(frame.fetch(0).is_some());

        assert!(frame.run(&CopyKernel::new(true)).is_err());
        assert!(frame.fetch(0).is_none());
    }

    #[test]
    fn test_output_allocated_once() {
        let allocator = CpuAllocator;
        let mut ctx = OpKernelContext::new(&[], 1, &allocator);
        ctx.output(0, TensorShape::from([1]), DataType::Float32)
            .unwrap();
        assert!(matches!(
            ctx.output(0, TensorShape::from([1]), DataType::Float32),
            Err(KernelError::Output(_))
        ));
        assert!(matches!(
            ctx.output(1, TensorShape::from([1]), DataType::Float32),
            Err(KernelError::Output(_))
        ));
    }

    #[test]
    fn test_missing_output_is_an_error() {
        let allocator = CpuAllocator;
        let ctx = OpKernelContext::new(&[], 1, &allocator);
        assert!(matches!(ctx.into_outputs(), Err(KernelError::Output(_))));
    }

    #[test]
    fn test_input_out_of_range() {
        let allocator = CpuAllocator;
        let ctx = OpKernelContext::new(&[], 0, &allocator);
        assert!(matches!(ctx.input(0), Err(KernelError::InvalidArgument(_))));
    }

    #[test]
    fn test_cpu_allocator_zero_fills() {
        let tensor = CpuAllocator
            .allocate(&TensorShape::from([2, 3]), DataType::Float64)
            .unwrap();
        assert_eq!(tensor.data::<f64>().unwrap(), &[0.0; 6]);
    }

    #[test]
    fn test_cpu_allocator_rejects_oversized_shapes() {
        let err = CpuAllocator
            .allocate(&TensorShape::from([usize::MAX, 2]), DataType::Float32)
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));

        let err = CpuAllocator
            .allocate(&TensorShape::from([usize::MAX / 2]), DataType::Float64)
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
    }
}

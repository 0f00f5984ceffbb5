//! PCATransformer operator kernel.
//!
//! Input 0 is the serialized transform (`UInt8`), input 1 the `[N, D]` batch
//! (`Float32` or `Float64`). Output 0 is the `[N, P]` projection in the
//! batch's element type.
//!
//! Each call walks `Loading -> Executing -> Flushing -> Done`. The execute
//! phase writes into a write-once [`OutputSlot`]; the slot is sealed before
//! flush starts and flush only sees a sink that refuses every emission.

use std::sync::Arc;

use featurizer_core::{Element, FeaturizerError, PcaTransformer, Transformer};
use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::cache::TransformCache;
use crate::error::{KernelError, Result};
use crate::frame::OpKernelContext;
use crate::kernel_def::{KernelDef, KernelDefBuilder, OpKernel, FEATURIZERS_DOMAIN};
use crate::tensor::{DataType, TensorElement, TensorShape};

pub const OP_NAME: &str = "PCATransformer";
pub const SINCE_VERSION: u32 = 1;

/// Kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcaKernelConfig {
    /// Keep deserialized transforms keyed by archive digest
    pub cache_transforms: bool,
    /// Distinct archives kept per element type before evicting the oldest
    pub max_cached_archives: usize,
}

impl Default for PcaKernelConfig {
    fn default() -> Self {
        Self {
            cache_transforms: true,
            max_cached_archives: 16,
        }
    }
}

impl PcaKernelConfig {
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_transforms = enabled;
        self
    }

    pub fn with_max_cached_archives(mut self, max: usize) -> Self {
        self.max_cached_archives = max;
        self
    }
}

/// Per-call lifecycle of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelPhase {
    Loading,
    Executing,
    Flushing,
    Done,
}

/// Registration metadata for [`PcaTransformerKernel`].
pub fn kernel_def() -> KernelDef {
    KernelDefBuilder::new()
        .set_name(OP_NAME)
        .set_domain(FEATURIZERS_DOMAIN)
        .since_version(SINCE_VERSION)
        .type_constraint("T0", [DataType::UInt8])
        .type_constraint("InputT", [DataType::Float32, DataType::Float64])
        .build()
}

/// Write-once destination for a batch transform's emission.
pub struct OutputSlot<'o, T> {
    target: Option<ArrayViewMut2<'o, T>>,
}

impl<'o, T: Element> OutputSlot<'o, T> {
    pub fn new(target: ArrayViewMut2<'o, T>) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// Copy `value` into the target. Only the first call is accepted.
    pub fn write(&mut self, value: Array2<T>) -> featurizer_core::Result<()> {
        let mut target = self.target.take().ok_or_else(|| {
            FeaturizerError::Protocol("execute emitted more than one output".to_string())
        })?;
        if target.dim() != value.dim() {
            return Err(FeaturizerError::Protocol(format!(
                "execute emitted a {:?} matrix into a {:?} output",
                value.dim(),
                target.dim()
            )));
        }
        target.assign(&value);
        Ok(())
    }

    pub fn is_written(&self) -> bool {
        self.target.is_none()
    }

    /// Close the slot, returning whether it was written.
    pub fn seal(self) -> bool {
        self.is_written()
    }
}

/// Drive `transformer` through execute then flush, writing into `output`.
///
/// Fails with a protocol violation when execute emits anything other than
/// exactly one matrix of `output`'s shape, or when flush emits at all.
pub fn apply_transformer<'i, T, X>(
    transformer: &mut X,
    input: ArrayView2<'i, T>,
    output: ArrayViewMut2<'_, T>,
) -> featurizer_core::Result<()>
where
    T: Element,
    X: Transformer<ArrayView2<'i, T>, Output = Array2<T>>,
{
    let mut slot = OutputSlot::new(output);
    trace!(phase = ?KernelPhase::Executing, "execute");
    transformer.execute(input, &mut |produced| slot.write(produced))?;
    let written = slot.seal();

    trace!(phase = ?KernelPhase::Flushing, "flush");
    transformer.flush(&mut |_| {
        Err(FeaturizerError::Protocol(
            "flush emitted output after execute completed".to_string(),
        ))
    })?;

    if !written {
        return Err(FeaturizerError::Protocol(
            "execute completed without emitting output".to_string(),
        ));
    }
    trace!(phase = ?KernelPhase::Done, "done");
    Ok(())
}

/// Element types the kernel dispatches to.
pub trait PcaElement: Element + TensorElement {
    fn cache(caches: &TransformCaches) -> &TransformCache<PcaTransformer<Self>>;
}

/// One transform cache per element type.
pub struct TransformCaches {
    f32: TransformCache<PcaTransformer<f32>>,
    f64: TransformCache<PcaTransformer<f64>>,
}

impl TransformCaches {
    fn new(capacity: usize) -> Self {
        Self {
            f32: TransformCache::new(capacity),
            f64: TransformCache::new(capacity),
        }
    }
}

impl PcaElement for f32 {
    fn cache(caches: &TransformCaches) -> &TransformCache<PcaTransformer<f32>> {
        &caches.f32
    }
}

impl PcaElement for f64 {
    fn cache(caches: &TransformCaches) -> &TransformCache<PcaTransformer<f64>> {
        &caches.f64
    }
}

/// Applies a serialized PCA transform to a batch of rows.
pub struct PcaTransformerKernel {
    def: KernelDef,
    config: PcaKernelConfig,
    caches: TransformCaches,
}

impl Default for PcaTransformerKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl PcaTransformerKernel {
    pub fn new() -> Self {
        Self::with_config(PcaKernelConfig::default())
    }

    pub fn with_config(config: PcaKernelConfig) -> Self {
        Self {
            def: kernel_def(),
            caches: TransformCaches::new(config.max_cached_archives),
            config,
        }
    }

    pub fn config(&self) -> &PcaKernelConfig {
        &self.config
    }

    /// Cache backing `T` inputs.
    pub fn cache<T: PcaElement>(&self) -> &TransformCache<PcaTransformer<T>> {
        T::cache(&self.caches)
    }

    fn load<T: PcaElement>(&self, bytes: &[u8]) -> Result<Arc<PcaTransformer<T>>> {
        trace!(phase = ?KernelPhase::Loading, bytes = bytes.len(), "load");
        if self.config.cache_transforms {
            let transformer = self
                .cache::<T>()
                .get_or_load(bytes, || PcaTransformer::from_bytes(bytes))?;
            Ok(transformer)
        } else {
            Ok(Arc::new(PcaTransformer::from_bytes(bytes)?))
        }
    }

    fn compute_typed<T: PcaElement>(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        let archive = ctx.input(0)?;
        self.def.check("T0", archive.data_type())?;
        let transformer = self.load::<T>(archive.data::<u8>()?)?;

        let input = ctx.input(1)?.view2::<T>()?;
        let (rows, cols) = input.dim();
        if cols != transformer.input_dims() {
            return Err(KernelError::DimensionMismatch {
                expected: transformer.input_dims(),
                actual: cols,
            });
        }

        let shape = TensorShape::from([rows, transformer.output_dims()]);
        debug!("{} [{}, {}] -> {}", OP_NAME, rows, cols, shape);
        let output = ctx.output(0, shape, T::DATA_TYPE)?;

        let mut session = transformer.session();
        apply_transformer(&mut session, input, output.view2_mut::<T>()?)?;
        Ok(())
    }
}

impl OpKernel for PcaTransformerKernel {
    fn def(&self) -> &KernelDef {
        &self.def
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        if ctx.input_count() != 2 {
            return Err(KernelError::invalid_argument(format!(
                "{} takes 2 inputs, got {}",
                OP_NAME,
                ctx.input_count()
            )));
        }

        match ctx.input(1)?.data_type() {
            DataType::Float32 => self.compute_typed::<f32>(ctx),
            DataType::Float64 => self.compute_typed::<f64>(ctx),
            other => Err(KernelError::UnsupportedType {
                op: OP_NAME.to_string(),
                constraint: "InputT".to_string(),
                data_type: other,
            }),
        }
    }
}

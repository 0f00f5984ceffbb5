//! Featurizer Operator Kernels
//!
//! CPU kernels that run pretrained featurizers inside a single-node execution
//! frame: the `PCATransformer` kernel plus a set of elementwise activations.
//!
//! # Example
//!
//! ```rust
//! use featurizer_core::{ElementType, PcaTransformer};
//! use featurizer_ops::{ExecutionFrame, KernelRegistry, NodeAttributes, Tensor, FEATURIZERS_DOMAIN};
//! use ndarray::array;
//!
//! let fitted = PcaTransformer::new(array![[1.0f32, 0.0, 0.0]], None).unwrap();
//! let archive = Tensor::from_bytes(fitted.to_bytes(ElementType::Float32).unwrap());
//! let batch = Tensor::from_vec([2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//!
//! let registry = KernelRegistry::cpu();
//! let kernel = registry
//!     .create("PCATransformer", FEATURIZERS_DOMAIN, &NodeAttributes::new())
//!     .unwrap();
//!
//! let mut frame = ExecutionFrame::new(vec![archive, batch], 1);
//! frame.run(kernel.as_ref()).unwrap();
//! let output = frame.fetch(0).unwrap();
//! assert_eq!(output.shape().dims(), &[2, 1]);
//! assert_eq!(output.data::<f32>().unwrap(), &[1.0, 4.0]);
//! ```

pub mod activation;
pub mod cache;
pub mod error;
pub mod frame;
pub mod kernel_def;
pub mod pca_kernel;
pub mod registry;
pub mod tensor;

// Re-export main types at crate root
pub use activation::{
    Activation, ActivationKernel, Elu, Gelu, HardSigmoid, LeakyRelu, ParametricSoftplus, Relu,
    ScaledTanh, Selu,
};
pub use cache::{archive_key, CacheStats, TransformCache};
pub use error::{KernelError, Result};
pub use frame::{Allocator, CpuAllocator, ExecutionFrame, OpKernelContext};
pub use kernel_def::{
    AttributeValue, KernelDef, KernelDefBuilder, NodeAttributes, OpKernel, TypeConstraint,
    CPU_PROVIDER, FEATURIZERS_DOMAIN, MS_DOMAIN, ONNX_DOMAIN,
};
pub use pca_kernel::{
    apply_transformer, KernelPhase, OutputSlot, PcaElement, PcaKernelConfig, PcaTransformerKernel,
};
pub use registry::{KernelFactory, KernelRegistry};
pub use tensor::{DataType, Tensor, TensorData, TensorElement, TensorShape};

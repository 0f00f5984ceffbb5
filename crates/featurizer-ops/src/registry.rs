//! Kernel registry
//!
//! Maps `(domain, name)` to a [`KernelDef`] and a factory that builds the
//! kernel from node attributes.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::activation::{
    self, Activation, Elu, Gelu, HardSigmoid, LeakyRelu, ParametricSoftplus,
    Relu, ScaledTanh, Selu,
};
use crate::error::{KernelError, Result};
use crate::kernel_def::{KernelDef, NodeAttributes, OpKernel};
use crate::pca_kernel::{self, PcaKernelConfig, PcaTransformerKernel};

/// Builds a kernel instance from node attributes.
pub type KernelFactory = Box<dyn Fn(&NodeAttributes) -> Result<Box<dyn OpKernel>> + Send + Sync>;

struct Registration {
    def: KernelDef,
    factory: KernelFactory,
}

/// Registered kernels keyed by domain and operator name.
#[derive(Default)]
pub struct KernelRegistry {
    kernels: BTreeMap<(String, String), Registration>,
}

impl KernelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every CPU kernel in this crate.
    pub fn cpu() -> Self {
        Self::cpu_with_config(PcaKernelConfig::default())
    }

    /// Like [`cpu`](Self::cpu) with an explicit PCA kernel configuration.
    pub fn cpu_with_config(config: PcaKernelConfig) -> Self {
        let mut registry = Self::new();
        let results = [
            registry.register(
                pca_kernel::kernel_def(),
                Box::new(move |_: &NodeAttributes| {
                    Ok(Box::new(PcaTransformerKernel::with_config(config.clone()))
                        as Box<dyn OpKernel>)
                }),
            ),
            registry.register_activation::<Relu>(),
            registry.register_activation::<Gelu>(),
            registry.register_activation::<ScaledTanh>(),
            registry.register_activation::<Elu>(),
            registry.register_activation::<HardSigmoid>(),
            registry.register_activation::<LeakyRelu>(),
            registry.register_activation::<ParametricSoftplus>(),
            registry.register_activation::<Selu>(),
        ];
        for err in results.into_iter().filter_map(|r| r.err()) {
            warn!("Skipped kernel registration: {}", err);
        }
        info!("CPU kernel registry ready with {} kernels", registry.len());
        registry
    }

    /// Register `def` with `factory`. Fails when the key is already taken.
    pub fn register(&mut self, def: KernelDef, factory: KernelFactory) -> Result<()> {
        let key = (def.domain().to_string(), def.name().to_string());
        if self.kernels.contains_key(&key) {
            return Err(KernelError::invalid_argument(format!(
                "kernel {}::{} is already registered",
                key.0, key.1
            )));
        }
        debug!(
            "Registered {}::{} (since v{})",
            def.domain(),
            def.name(),
            def.since_version()
        );
        self.kernels.insert(key, Registration { def, factory });
        Ok(())
    }

    pub fn register_activation<A: Activation>(&mut self) -> Result<()> {
        self.register(
            activation::kernel_def::<A>(),
            Box::new(activation::create_kernel::<A>),
        )
    }

    /// Definition registered under `name` in `domain`.
    pub fn lookup(&self, name: &str, domain: &str) -> Option<&KernelDef> {
        self.kernels
            .get(&(domain.to_string(), name.to_string()))
            .map(|r| &r.def)
    }

    /// Build the kernel registered under `name` in `domain`.
    pub fn create(
        &self,
        name: &str,
        domain: &str,
        attributes: &NodeAttributes,
    ) -> Result<Box<dyn OpKernel>> {
        let registration = self
            .kernels
            .get(&(domain.to_string(), name.to_string()))
            .ok_or_else(|| KernelError::KernelNotFound {
                name: name.to_string(),
                domain: domain.to_string(),
            })?;
        (registration.factory)(attributes)
    }

    /// All definitions ordered by domain then name.
    pub fn defs(&self) -> impl Iterator<Item = &KernelDef> {
        self.kernels.values().map(|r| &r.def)
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_def::{FEATURIZERS_DOMAIN, MS_DOMAIN, ONNX_DOMAIN};

    #[test]
    fn test_cpu_registry_contents() {
        let registry = KernelRegistry::cpu();
        assert_eq!(registry.len(), 9);
        assert!(registry.lookup("PCATransformer", FEATURIZERS_DOMAIN).is_some());
        assert!(registry.lookup("Gelu", MS_DOMAIN).is_some());
        assert!(registry.lookup("ScaledTanh", MS_DOMAIN).is_some());
        assert!(registry.lookup("ParametricSoftplus", ONNX_DOMAIN).is_some());
        assert!(registry.lookup("Gelu", ONNX_DOMAIN).is_none());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = KernelRegistry::new();
        registry.register_activation::<Relu>().unwrap();
        assert!(registry.register_activation::<Relu>().is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_unknown_kernel() {
        let registry = KernelRegistry::cpu();
        let err = registry
            .create("Softmax", ONNX_DOMAIN, &NodeAttributes::new())
            .err()
            .unwrap();
        assert_eq!(
            err,
            KernelError::KernelNotFound {
                name: "Softmax".to_string(),
                domain: String::new(),
            }
        );
    }

    #[test]
    fn test_create_passes_attributes() {
        let registry = KernelRegistry::cpu();
        let kernel = registry
            .create("Elu", ONNX_DOMAIN, &NodeAttributes::new().with_float("alpha", 0.5))
            .unwrap();
        assert_eq!(kernel.def().name(), "Elu");
    }

    #[test]
    fn test_defs_are_sorted_by_domain() {
        let registry = KernelRegistry::cpu();
        let domains: Vec<&str> = registry.defs().map(|d| d.domain()).collect();
        let mut sorted = domains.clone();
        sorted.sort();
        assert_eq!(domains, sorted);
    }
}

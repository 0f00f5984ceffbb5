//! Operator registration metadata and the kernel trait.
//!
//! A [`KernelDef`] names an operator (name, domain, since-version, execution
//! provider) and declares which element types each of its type parameters
//! admits. Hosts use it to route a node to a kernel; kernels use it to reject
//! tensors outside their constraints with a uniform error.

use std::collections::HashMap;

use crate::error::{KernelError, Result};
use crate::frame::OpKernelContext;
use crate::tensor::DataType;

/// Default ONNX operator domain.
pub const ONNX_DOMAIN: &str = "";
/// Microsoft contrib operator domain.
pub const MS_DOMAIN: &str = "com.microsoft";
/// Featurizer operator domain.
pub const FEATURIZERS_DOMAIN: &str = "com.microsoft.mlfeaturizers";
/// Provider every kernel in this crate runs on.
pub const CPU_PROVIDER: &str = "CPUExecutionProvider";

/// A named type parameter and the element types it admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeConstraint {
    pub name: String,
    pub allowed: Vec<DataType>,
}

/// Registration metadata for one operator kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDef {
    name: String,
    domain: String,
    since_version: u32,
    provider: String,
    constraints: Vec<TypeConstraint>,
}

impl KernelDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn since_version(&self) -> u32 {
        self.since_version
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn constraints(&self) -> &[TypeConstraint] {
        &self.constraints
    }

    /// Whether `constraint` admits `data_type`. Unknown constraints admit nothing.
    pub fn supports(&self, constraint: &str, data_type: DataType) -> bool {
        self.constraints
            .iter()
            .find(|c| c.name == constraint)
            .map(|c| c.allowed.contains(&data_type))
            .unwrap_or(false)
    }

    /// Like [`supports`](Self::supports) but yields a descriptive error.
    pub fn check(&self, constraint: &str, data_type: DataType) -> Result<()> {
        if self.supports(constraint, data_type) {
            Ok(())
        } else {
            Err(KernelError::UnsupportedType {
                op: self.name.clone(),
                constraint: constraint.to_string(),
                data_type,
            })
        }
    }
}

/// Builder for [`KernelDef`].
#[derive(Debug, Clone)]
pub struct KernelDefBuilder {
    def: KernelDef,
}

impl Default for KernelDefBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelDefBuilder {
    pub fn new() -> Self {
        Self {
            def: KernelDef {
                name: String::new(),
                domain: ONNX_DOMAIN.to_string(),
                since_version: 1,
                provider: CPU_PROVIDER.to_string(),
                constraints: Vec::new(),
            },
        }
    }

    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.def.name = name.into();
        self
    }

    pub fn set_domain(mut self, domain: impl Into<String>) -> Self {
        self.def.domain = domain.into();
        self
    }

    pub fn since_version(mut self, version: u32) -> Self {
        self.def.since_version = version;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.def.provider = provider.into();
        self
    }

    /// Declare (or replace) a type constraint.
    pub fn type_constraint(
        mut self,
        name: impl Into<String>,
        allowed: impl IntoIterator<Item = DataType>,
    ) -> Self {
        let name = name.into();
        let allowed: Vec<DataType> = allowed.into_iter().collect();
        self.def.constraints.retain(|c| c.name != name);
        self.def.constraints.push(TypeConstraint { name, allowed });
        self
    }

    pub fn build(self) -> KernelDef {
        self.def
    }
}

/// Attribute value attached to a graph node.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
}

/// Node attributes a kernel is constructed from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeAttributes {
    values: HashMap<String, AttributeValue>,
}

impl NodeAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_float(mut self, name: impl Into<String>, value: f32) -> Self {
        self.values.insert(name.into(), AttributeValue::Float(value));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// Float attribute `name`, or `default` when absent.
    pub fn float_or(&self, name: &str, default: f32) -> Result<f32> {
        match self.values.get(name) {
            None => Ok(default),
            Some(AttributeValue::Float(v)) => Ok(*v),
            Some(other) => Err(KernelError::invalid_argument(format!(
                "attribute '{}' must be a float, got {:?}",
                name, other
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A compute kernel for one operator.
///
/// `compute` is called once per node execution. Kernels hold no per-call
/// state, so one instance can serve concurrent frames.
pub trait OpKernel: Send + Sync {
    fn def(&self) -> &KernelDef;

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_def() -> KernelDef {
        KernelDefBuilder::new()
            .set_name("PCATransformer")
            .set_domain(FEATURIZERS_DOMAIN)
            .since_version(1)
            .type_constraint("T0", [DataType::UInt8])
            .type_constraint("InputT", [DataType::Float32, DataType::Float64])
            .build()
    }

    #[test]
    fn test_builder_fields() {
        let def = sample_def();
        assert_eq!(def.name(), "PCATransformer");
        assert_eq!(def.domain(), FEATURIZERS_DOMAIN);
        assert_eq!(def.since_version(), 1);
        assert_eq!(def.provider(), CPU_PROVIDER);
        assert_eq!(def.constraints().len(), 2);
    }

    #[test]
    fn test_supports_checks_constraint_membership() {
        let def = sample_def();
        assert!(def.supports("InputT", DataType::Float32));
        assert!(def.supports("InputT", DataType::Float64));
        assert!(!def.supports("InputT", DataType::UInt8));
        assert!(!def.supports("Missing", DataType::Float32));
    }

    #[test]
    fn test_check_reports_op_and_constraint() {
        let err = sample_def().check("T0", DataType::Float32).unwrap_err();
        assert_eq!(
            err,
            KernelError::UnsupportedType {
                op: "PCATransformer".to_string(),
                constraint: "T0".to_string(),
                data_type: DataType::Float32,
            }
        );
    }

    #[test]
    fn test_type_constraint_replaces_existing() {
        let def = KernelDefBuilder::new()
            .set_name("Relu")
            .type_constraint("T", [DataType::Float64])
            .type_constraint("T", [DataType::Float32])
            .build();
        assert_eq!(def.constraints().len(), 1);
        assert!(def.supports("T", DataType::Float32));
        assert!(!def.supports("T", DataType::Float64));
    }

    #[test]
    fn test_float_attributes() {
        let attrs = NodeAttributes::new().with_float("alpha", 0.8);
        assert_eq!(attrs.float_or("alpha", 1.0).unwrap(), 0.8);
        assert_eq!(attrs.float_or("beta", 0.3).unwrap(), 0.3);

        let mut attrs = attrs;
        attrs.insert("beta", AttributeValue::Int(2));
        assert!(attrs.float_or("beta", 0.3).is_err());
    }
}

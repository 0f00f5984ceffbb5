//! Elementwise activation kernels
//!
//! Each activation is a small functor over `f32` built from node attributes.
//! [`ActivationKernel`] wraps one into an [`OpKernel`] that maps input 0 to an
//! identically shaped output 0.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{KernelError, Result};
use crate::frame::OpKernelContext;
use crate::kernel_def::{
    KernelDef, KernelDefBuilder, NodeAttributes, OpKernel, MS_DOMAIN, ONNX_DOMAIN,
};
use crate::tensor::DataType;

/// Elements per rayon task.
#[cfg(feature = "parallel")]
const PARALLEL_CHUNK: usize = 16 * 1024;

/// A scalar activation function.
pub trait Activation: Send + Sync + Sized + 'static {
    const OP_NAME: &'static str;
    const DOMAIN: &'static str;
    const SINCE_VERSION: u32 = 1;

    fn from_attributes(attributes: &NodeAttributes) -> Result<Self>;

    fn apply(&self, x: f32) -> f32;
}

/// max(0, x)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Relu;

impl Activation for Relu {
    const OP_NAME: &'static str = "Relu";
    const DOMAIN: &'static str = ONNX_DOMAIN;

    fn from_attributes(_: &NodeAttributes) -> Result<Self> {
        Ok(Self)
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        x.max(0.0)
    }
}

/// 0.5·x·(1 + erf(x/√2))
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gelu;

impl Activation for Gelu {
    const OP_NAME: &'static str = "Gelu";
    const DOMAIN: &'static str = MS_DOMAIN;

    fn from_attributes(_: &NodeAttributes) -> Result<Self> {
        Ok(Self)
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        let x = x as f64;
        (0.5 * x * (1.0 + erf(x * std::f64::consts::FRAC_1_SQRT_2))) as f32
    }
}

/// Abramowitz & Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// alpha·tanh(beta·x)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledTanh {
    pub alpha: f32,
    pub beta: f32,
}

impl Activation for ScaledTanh {
    const OP_NAME: &'static str = "ScaledTanh";
    const DOMAIN: &'static str = MS_DOMAIN;

    fn from_attributes(attributes: &NodeAttributes) -> Result<Self> {
        Ok(Self {
            alpha: attributes.float_or("alpha", 1.0)?,
            beta: attributes.float_or("beta", 1.0)?,
        })
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        self.alpha * (self.beta * x).tanh()
    }
}

/// x for x ≥ 0, alpha·(eˣ − 1) otherwise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Elu {
    pub alpha: f32,
}

impl Activation for Elu {
    const OP_NAME: &'static str = "Elu";
    const DOMAIN: &'static str = ONNX_DOMAIN;
    const SINCE_VERSION: u32 = 6;

    fn from_attributes(attributes: &NodeAttributes) -> Result<Self> {
        Ok(Self {
            alpha: attributes.float_or("alpha", 1.0)?,
        })
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        if x >= 0.0 {
            x
        } else {
            self.alpha * x.exp_m1()
        }
    }
}

/// clamp(alpha·x + beta, 0, 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardSigmoid {
    pub alpha: f32,
    pub beta: f32,
}

impl Activation for HardSigmoid {
    const OP_NAME: &'static str = "HardSigmoid";
    const DOMAIN: &'static str = ONNX_DOMAIN;
    const SINCE_VERSION: u32 = 6;

    fn from_attributes(attributes: &NodeAttributes) -> Result<Self> {
        Ok(Self {
            alpha: attributes.float_or("alpha", 0.2)?,
            beta: attributes.float_or("beta", 0.5)?,
        })
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        (self.alpha * x + self.beta).clamp(0.0, 1.0)
    }
}

/// x for x ≥ 0, alpha·x otherwise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyRelu {
    pub alpha: f32,
}

impl Activation for LeakyRelu {
    const OP_NAME: &'static str = "LeakyRelu";
    const DOMAIN: &'static str = ONNX_DOMAIN;
    const SINCE_VERSION: u32 = 6;

    fn from_attributes(attributes: &NodeAttributes) -> Result<Self> {
        Ok(Self {
            alpha: attributes.float_or("alpha", 0.01)?,
        })
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        if x >= 0.0 {
            x
        } else {
            self.alpha * x
        }
    }
}

/// alpha·ln(1 + e^(beta·x))
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParametricSoftplus {
    pub alpha: f32,
    pub beta: f32,
}

impl Activation for ParametricSoftplus {
    const OP_NAME: &'static str = "ParametricSoftplus";
    const DOMAIN: &'static str = ONNX_DOMAIN;

    fn from_attributes(attributes: &NodeAttributes) -> Result<Self> {
        Ok(Self {
            alpha: attributes.float_or("alpha", 1.0)?,
            beta: attributes.float_or("beta", 1.0)?,
        })
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        let z = self.beta * x;
        // ln(1 + e^z) = z + ln(1 + e^-z) keeps exp from overflowing
        let softplus = if z > 0.0 {
            z + (-z).exp().ln_1p()
        } else {
            z.exp().ln_1p()
        };
        self.alpha * softplus
    }
}

/// gamma·x for x > 0, gamma·alpha·(eˣ − 1) otherwise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selu {
    pub alpha: f32,
    pub gamma: f32,
}

impl Selu {
    pub const DEFAULT_ALPHA: f32 = 1.673_263_2;
    pub const DEFAULT_GAMMA: f32 = 1.050_701;
}

impl Activation for Selu {
    const OP_NAME: &'static str = "Selu";
    const DOMAIN: &'static str = ONNX_DOMAIN;
    const SINCE_VERSION: u32 = 6;

    fn from_attributes(attributes: &NodeAttributes) -> Result<Self> {
        Ok(Self {
            alpha: attributes.float_or("alpha", Self::DEFAULT_ALPHA)?,
            gamma: attributes.float_or("gamma", Self::DEFAULT_GAMMA)?,
        })
    }

    #[inline]
    fn apply(&self, x: f32) -> f32 {
        if x > 0.0 {
            self.gamma * x
        } else {
            self.gamma * self.alpha * x.exp_m1()
        }
    }
}

/// Registration metadata for activation `A`.
pub fn kernel_def<A: Activation>() -> KernelDef {
    KernelDefBuilder::new()
        .set_name(A::OP_NAME)
        .set_domain(A::DOMAIN)
        .since_version(A::SINCE_VERSION)
        .type_constraint("T", [DataType::Float32])
        .build()
}

/// Shape-preserving `Float32` kernel applying `A` to every element.
pub struct ActivationKernel<A: Activation> {
    def: KernelDef,
    activation: A,
}

impl<A: Activation> ActivationKernel<A> {
    pub fn new(activation: A) -> Self {
        Self {
            def: kernel_def::<A>(),
            activation,
        }
    }

    pub fn from_attributes(attributes: &NodeAttributes) -> Result<Self> {
        A::from_attributes(attributes).map(Self::new)
    }

    pub fn activation(&self) -> &A {
        &self.activation
    }

    /// Apply the activation from `input` into `output` (equal lengths).
    pub fn apply_slice(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());

        #[cfg(feature = "parallel")]
        {
            if input.len() > PARALLEL_CHUNK {
                output
                    .par_chunks_mut(PARALLEL_CHUNK)
                    .zip(input.par_chunks(PARALLEL_CHUNK))
                    .for_each(|(out, inp)| self.apply_serial(inp, out));
                return;
            }
        }

        self.apply_serial(input, output);
    }

    fn apply_serial(&self, input: &[f32], output: &mut [f32]) {
        for (y, &x) in output.iter_mut().zip(input) {
            *y = self.activation.apply(x);
        }
    }
}

impl<A: Activation> OpKernel for ActivationKernel<A> {
    fn def(&self) -> &KernelDef {
        &self.def
    }

    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()> {
        if ctx.input_count() != 1 {
            return Err(KernelError::invalid_argument(format!(
                "{} takes 1 input, got {}",
                A::OP_NAME,
                ctx.input_count()
            )));
        }
        let input = ctx.input(0)?;
        self.def.check("T", input.data_type())?;

        let output = ctx.output(0, input.shape().clone(), DataType::Float32)?;
        self.apply_slice(input.data::<f32>()?, output.data_mut::<f32>()?);
        Ok(())
    }
}

/// Registry factory for `ActivationKernel<A>`.
pub(crate) fn create_kernel<A: Activation>(attributes: &NodeAttributes) -> Result<Box<dyn OpKernel>> {
    Ok(Box::new(ActivationKernel::<A>::from_attributes(attributes)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-5,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_erf_reference_points() {
        assert!(erf(0.0).abs() < 1e-7);
        assert!((erf(1.0) - 0.842_700_79).abs() < 2e-7);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 2e-7);
        assert!((erf(3.0) - 0.999_977_9).abs() < 2e-7);
    }

    #[test]
    fn test_gelu() {
        assert_close(Gelu.apply(0.0), 0.0);
        assert_close(Gelu.apply(1.0), 0.841_344_7);
        assert_close(Gelu.apply(-1.0), -0.158_655_3);
    }

    #[test]
    fn test_scaled_tanh() {
        let op = ScaledTanh {
            alpha: 0.8,
            beta: 0.3,
        };
        assert_close(op.apply(1.0), 0.8 * 0.3f32.tanh());
    }

    #[test]
    fn test_elu_and_selu() {
        let elu = Elu { alpha: 1.0 };
        assert_close(elu.apply(2.0), 2.0);
        assert_close(elu.apply(-1.0), (-1.0f32).exp() - 1.0);

        let selu = Selu::from_attributes(&NodeAttributes::new()).unwrap();
        assert_close(selu.apply(1.0), Selu::DEFAULT_GAMMA);
        assert_close(
            selu.apply(-1.0),
            Selu::DEFAULT_GAMMA * Selu::DEFAULT_ALPHA * ((-1.0f32).exp() - 1.0),
        );
    }

    #[test]
    fn test_hard_sigmoid_clamps() {
        let op = HardSigmoid::from_attributes(&NodeAttributes::new()).unwrap();
        assert_close(op.apply(0.5), 0.6);
        assert_close(op.apply(10.0), 1.0);
        assert_close(op.apply(-10.0), 0.0);
    }

    #[test]
    fn test_leaky_relu() {
        let op = LeakyRelu { alpha: 0.2 };
        assert_close(op.apply(3.0), 3.0);
        assert_close(op.apply(-3.0), -0.6);
        assert_close(Relu.apply(-3.0), 0.0);
    }

    #[test]
    fn test_softplus_is_stable() {
        let op = ParametricSoftplus {
            alpha: 1.0,
            beta: 1.0,
        };
        assert_close(op.apply(0.0), std::f32::consts::LN_2);
        assert_close(op.apply(100.0), 100.0);
        assert!(op.apply(-100.0) >= 0.0);
        assert!(op.apply(-100.0) < 1e-30);
        assert!(op.apply(1000.0).is_finite());
    }

    #[test]
    fn test_attribute_defaults_and_overrides() {
        let attrs = NodeAttributes::new().with_float("alpha", 0.8).with_float("beta", 0.3);
        let op = ScaledTanh::from_attributes(&attrs).unwrap();
        assert_eq!(op.alpha, 0.8);
        assert_eq!(op.beta, 0.3);

        let op = LeakyRelu::from_attributes(&NodeAttributes::new()).unwrap();
        assert_eq!(op.alpha, 0.01);
    }

    #[test]
    fn test_apply_slice() {
        let kernel = ActivationKernel::new(Relu);
        let input = [-1.0f32, 0.0, 2.0];
        let mut output = [9.0f32; 3];
        kernel.apply_slice(&input, &mut output);
        assert_eq!(output, [0.0, 0.0, 2.0]);
    }
}

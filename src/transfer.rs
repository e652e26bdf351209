use derive_more::Display;
use faer::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, error::check_len};

/// Distance from 0 and 1 that `Step` keeps its outputs at, so a logistic cost over a step
/// output stays finite.
pub const STEP_EPSILON: f32 = 1e-5;

/// Elementwise transfer (activation) function of a layer.
#[derive(Debug, Display, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferFunction {
    /// Pass-through used by the input layer only. Never differentiated.
    #[display("input")]
    InputPlaceholder,
    #[display("identity")]
    Identity,
    #[display("linear({slope})")]
    Linear { slope: f32 },
    #[display("sigmoid")]
    Sigmoid,
    #[display("tanh")]
    Tanh,
    #[display("rectified")]
    Rectified,
    #[display("softplus")]
    Softplus,
    /// Threshold at zero. Only usable as the output activation.
    #[display("step")]
    Step,
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + f32::exp(-x))
}

/// `ln(1 + e^x)`, rearranged so large `|x|` neither overflows nor loses the linear tail.
fn softplus(x: f32) -> f32 {
    x.max(0.0) + f32::ln_1p(f32::exp(-x.abs()))
}

impl TransferFunction {
    pub fn validate(self) -> Result<()> {
        if let TransferFunction::Linear { slope } = self {
            if !slope.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "linear slope must be finite, got {slope}"
                )));
            }
        }
        Ok(())
    }

    /// Whether `derivative` is defined for this function.
    pub fn is_differentiable(self) -> bool {
        !matches!(
            self,
            TransferFunction::InputPlaceholder | TransferFunction::Step
        )
    }

    pub fn apply_scalar(self, z: f32) -> f32 {
        match self {
            TransferFunction::InputPlaceholder | TransferFunction::Identity => z,
            TransferFunction::Linear { slope } => slope * z,
            TransferFunction::Sigmoid => sigmoid(z),
            TransferFunction::Tanh => f32::tanh(z),
            TransferFunction::Rectified => z.max(0.0),
            TransferFunction::Softplus => softplus(z),
            TransferFunction::Step => match z >= 0.0 {
                true => 1.0 - STEP_EPSILON,
                false => STEP_EPSILON,
            },
        }
    }

    /// Derivative at pre-activation `z`, given the matching post-activation `a`.
    pub fn derivative_scalar(self, z: f32, a: f32) -> Result<f32> {
        match self {
            TransferFunction::InputPlaceholder => Err(Error::InvalidOperation(
                "the input layer is never differentiated".into(),
            )),
            TransferFunction::Step => Err(Error::InvalidOperation(
                "step transfer function has no usable derivative".into(),
            )),
            TransferFunction::Identity => Ok(1.0),
            TransferFunction::Linear { slope } => Ok(slope),
            TransferFunction::Sigmoid => {
                let s = sigmoid(z);
                Ok(s * (1.0 - s))
            }
            TransferFunction::Tanh => Ok(1.0 - a * a),
            TransferFunction::Rectified => Ok(if z > 0.0 { 1.0 } else { 0.0 }),
            TransferFunction::Softplus => Ok(sigmoid(z)),
        }
    }

    pub fn apply(self, z: ColRef<f32>) -> Col<f32> {
        Col::from_fn(z.nrows(), |k| self.apply_scalar(z[k]))
    }

    pub fn derivative(self, z: ColRef<f32>, a: ColRef<f32>) -> Result<Col<f32>> {
        check_len("transfer derivative activations", z.nrows(), a.nrows())?;
        let mut d = Col::<f32>::zeros(z.nrows());
        for k in 0..z.nrows() {
            d[k] = self.derivative_scalar(z[k], a[k])?;
        }
        Ok(d)
    }
}

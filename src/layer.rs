use derive_more::Display;
use faer::{Accum, linalg::matmul::matmul, prelude::*};

use crate::{Error, Result, TransferFunction, error::check_len, pretty_print::PrettyPrintLayer};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    #[display("input")]
    Input,
    #[display("hidden")]
    Hidden,
    #[display("output")]
    Output,
}

/// One fully connected layer.
///
/// `w` has one row per neuron of this layer and one column per neuron of the previous layer.
/// The input layer has no parameters (`w` is 0×0, `b` is empty) and `n_previous == n`.
#[derive(Debug, Clone)]
pub struct Layer {
    kind: LayerKind,
    /// Number of neurons in this layer.
    n: usize,
    /// Number of neurons in the previous layer.
    n_previous: usize,
    w: Mat<f32>,
    b: Col<f32>,
    phi: TransferFunction,
}

/// Output of one layer's forward step.
#[derive(Debug, Clone)]
pub struct FeedforwardResult {
    /// Pre-activation `W a_prev + b`.
    pub z: Col<f32>,
    /// Post-activation `φ(z)`.
    pub a: Col<f32>,
}

/// Error signal of a hidden layer.
#[derive(Debug, Clone)]
pub struct BackpropagationResult {
    /// `∂C/∂z` of this layer, i.e. `(W_nextᵀ δ_next) ⊙ (φ'(z) + flat spot)`.
    /// Becomes `output_errors` for the previous layer.
    pub weight_error: Col<f32>,
    /// Error seen by the bias units. Equal to `weight_error` since `∂z/∂b = 1`.
    pub bias_error: Col<f32>,
}

impl Layer {
    pub fn input(n: usize) -> Self {
        Self {
            kind: LayerKind::Input,
            n,
            n_previous: n,
            w: Mat::zeros(0, 0),
            b: Col::zeros(0),
            phi: TransferFunction::InputPlaceholder,
        }
    }

    /// Zero-initialised hidden or output layer.
    pub fn new(kind: LayerKind, n: usize, n_previous: usize, phi: TransferFunction) -> Result<Self> {
        Self::from_parts(kind, Mat::zeros(n, n_previous), Col::zeros(n), phi)
    }

    pub fn from_parts(
        kind: LayerKind,
        w: Mat<f32>,
        b: Col<f32>,
        phi: TransferFunction,
    ) -> Result<Self> {
        if kind == LayerKind::Input {
            return Err(Error::InvalidOperation(
                "input layers carry no parameters, use `Layer::input`".into(),
            ));
        }
        phi.validate()?;
        if phi == TransferFunction::InputPlaceholder {
            return Err(Error::InvalidConfig(format!(
                "{kind} layer cannot use the input placeholder transfer function"
            )));
        }
        if phi == TransferFunction::Step && kind != LayerKind::Output {
            return Err(Error::InvalidConfig(
                "step transfer function is only allowed on the output layer".into(),
            ));
        }
        let n = w.nrows();
        let n_previous = w.ncols();
        if n == 0 || n_previous == 0 {
            return Err(Error::InvalidConfig(format!(
                "{kind} layer must have at least one neuron and one input, got {n}x{n_previous}"
            )));
        }
        check_len("layer bias", n, b.nrows())?;
        Ok(Self {
            kind,
            n,
            n_previous,
            w,
            b,
            phi,
        })
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn n_previous(&self) -> usize {
        self.n_previous
    }

    pub fn w(&self) -> MatRef<'_, f32> {
        self.w.as_ref()
    }

    pub fn b(&self) -> ColRef<'_, f32> {
        self.b.as_ref()
    }

    /// Shape is fixed; only the values may be changed.
    pub fn w_mut(&mut self) -> MatMut<'_, f32> {
        self.w.as_mut()
    }

    pub fn b_mut(&mut self) -> ColMut<'_, f32> {
        self.b.as_mut()
    }

    pub(crate) fn params_mut(&mut self) -> (MatMut<'_, f32>, ColMut<'_, f32>) {
        (self.w.as_mut(), self.b.as_mut())
    }

    pub fn phi(&self) -> TransferFunction {
        self.phi
    }

    pub fn n_params(&self) -> usize {
        self.w.nrows() * self.w.ncols() + self.b.nrows()
    }

    pub fn pretty_print(&self, i_layer: usize) -> PrettyPrintLayer<'_> {
        PrettyPrintLayer::new(i_layer, self)
    }

    /// `z = W a_prev + b`, `a = φ(z)`. The input layer returns `a_prev` unchanged as both.
    pub fn feedforward(&self, a_prev: ColRef<f32>) -> Result<FeedforwardResult> {
        check_len("layer input", self.n_previous, a_prev.nrows())?;
        if self.kind == LayerKind::Input {
            let a = Col::from_fn(self.n, |k| a_prev[k]);
            return Ok(FeedforwardResult { z: a.clone(), a });
        }
        let mut z = Col::<f32>::zeros(self.n);
        // z = W * a_prev;
        matmul(z.as_mut(), Accum::Replace, self.w.as_ref(), a_prev, 1.0, Par::Seq);
        // z += b;
        for k in 0..self.n {
            z[k] += self.b[k];
        }
        let a = self.phi.apply(z.as_ref());
        Ok(FeedforwardResult { z, a })
    }

    /// Propagates `output_errors` (`∂C/∂z` of `next`) back through `next`'s weights into this
    /// layer. Only valid on hidden layers.
    pub fn backpropagate(
        &self,
        result: &FeedforwardResult,
        next: &Layer,
        output_errors: ColRef<f32>,
        flat_spot_elimination: f32,
    ) -> Result<BackpropagationResult> {
        if self.kind != LayerKind::Hidden {
            return Err(Error::InvalidOperation(format!(
                "cannot backpropagate through the {} layer",
                self.kind
            )));
        }
        check_len("next layer inputs", self.n, next.n_previous)?;
        check_len("output errors", next.n, output_errors.nrows())?;
        check_len("feedforward result", self.n, result.z.nrows())?;
        let mut gradient = self.phi.derivative(result.z.as_ref(), result.a.as_ref())?;
        for k in 0..self.n {
            gradient[k] += flat_spot_elimination;
        }
        let mut weight_error = Col::<f32>::zeros(self.n);
        // weight_error = W_next^T * output_errors;
        matmul(
            weight_error.as_mut(),
            Accum::Replace,
            next.w.as_ref().transpose(),
            output_errors,
            1.0,
            Par::Seq,
        );
        for k in 0..self.n {
            weight_error[k] *= gradient[k];
        }
        let bias_error = weight_error.clone();
        Ok(BackpropagationResult {
            weight_error,
            bias_error,
        })
    }
}

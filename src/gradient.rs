use std::ops::{AddAssign, MulAssign};

use faer::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use tracing::trace;

use crate::{CostFunction, Error, Layer, Network, Result, TrainingConfig, TrainingExample};

/// Accumulated `∂C/∂W` and `∂C/∂b` of one layer.
#[derive(Debug, Clone)]
pub struct ErrorGradient {
    pub dw: Mat<f32>,
    pub db: Col<f32>,
}

impl ErrorGradient {
    /// Additive identity for a layer of `n` neurons with `n_previous` inputs.
    pub fn zeros(n: usize, n_previous: usize) -> Self {
        Self {
            dw: Mat::zeros(n, n_previous),
            db: Col::zeros(n),
        }
    }

    pub fn zeros_like(layer: &Layer) -> Self {
        Self::zeros(layer.n(), layer.n_previous())
    }

    /// `dw = weight_error ⊗ a_prev`, `db = bias_error`.
    pub fn from_error(
        weight_error: ColRef<f32>,
        bias_error: ColRef<f32>,
        a_prev: ColRef<f32>,
    ) -> Self {
        Self {
            dw: Mat::from_fn(weight_error.nrows(), a_prev.nrows(), |k, g| {
                weight_error[k] * a_prev[g]
            }),
            db: Col::from_fn(bias_error.nrows(), |k| bias_error[k]),
        }
    }

    pub fn n(&self) -> usize {
        self.dw.nrows()
    }

    pub fn n_previous(&self) -> usize {
        self.dw.ncols()
    }

    /// Sum of squared entries of `dw` and `db`.
    pub fn norm_squared(&self) -> f32 {
        let mut sum = 0.0f32;
        for j in 0..self.dw.ncols() {
            for i in 0..self.dw.nrows() {
                sum += self.dw[(i, j)].powi(2);
            }
        }
        for k in 0..self.db.nrows() {
            sum += self.db[k].powi(2);
        }
        sum
    }
}

impl AddAssign<&ErrorGradient> for ErrorGradient {
    fn add_assign(&mut self, rhs: &ErrorGradient) {
        assert_eq!(self.dw.nrows(), rhs.dw.nrows());
        assert_eq!(self.dw.ncols(), rhs.dw.ncols());
        for j in 0..self.dw.ncols() {
            for i in 0..self.dw.nrows() {
                self.dw[(i, j)] += rhs.dw[(i, j)];
            }
        }
        for k in 0..self.db.nrows() {
            self.db[k] += rhs.db[k];
        }
    }
}

impl MulAssign<f32> for ErrorGradient {
    fn mul_assign(&mut self, rhs: f32) {
        for j in 0..self.dw.ncols() {
            for i in 0..self.dw.nrows() {
                self.dw[(i, j)] *= rhs;
            }
        }
        for k in 0..self.db.nrows() {
            self.db[k] *= rhs;
        }
    }
}

/// Cost and gradients of one batch.
#[derive(Debug, Clone)]
pub struct TrainingResult {
    pub cost: f32,
    /// One gradient per non-input layer: `gradients[0]` belongs to layer 1.
    pub gradients: Vec<ErrorGradient>,
}

impl TrainingResult {
    /// Gradient of layer `i_layer`. `None` for the input layer or an out of range index.
    pub fn gradient(&self, i_layer: usize) -> Option<&ErrorGradient> {
        self.gradients.get(i_layer.checked_sub(1)?)
    }
}

/// Partial sum over a subset of the batch.
#[derive(Debug, Clone)]
struct BatchAccumulator {
    cost: f32,
    n_examples: usize,
    gradients: Vec<ErrorGradient>,
}

impl BatchAccumulator {
    fn zeros(network: &Network) -> Self {
        Self {
            cost: 0.0,
            n_examples: 0,
            gradients: network.layers()[1..]
                .iter()
                .map(ErrorGradient::zeros_like)
                .collect(),
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.cost += other.cost;
        self.n_examples += other.n_examples;
        for (gradient, other) in self.gradients.iter_mut().zip(&other.gradients) {
            *gradient += other;
        }
        self
    }
}

#[derive(Debug)]
enum Parallelism {
    Sequential,
    /// Rayon's global pool.
    Global,
    Pool(ThreadPool),
}

/// Computes batch cost and per-layer gradients for a network.
#[derive(Debug)]
pub struct GradientEngine {
    cost_function: CostFunction,
    regularization: f32,
    flat_spot_elimination: f32,
    parallelism: Parallelism,
}

impl GradientEngine {
    /// Unregularized engine running on rayon's global pool with the default flat spot
    /// elimination of `0.1`.
    pub fn new(cost_function: CostFunction) -> Self {
        Self {
            cost_function,
            regularization: 0.0,
            flat_spot_elimination: 0.1,
            parallelism: Parallelism::Global,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.cost_function)
            .with_regularization(config.regularization)?
            .with_flat_spot_elimination(config.flat_spot_elimination)?
            .with_threads(config.threads)
    }

    pub fn with_regularization(mut self, lambda: f32) -> Result<Self> {
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "regularization must be finite and >= 0, got {lambda}"
            )));
        }
        self.regularization = lambda;
        Ok(self)
    }

    pub fn with_flat_spot_elimination(mut self, flat_spot_elimination: f32) -> Result<Self> {
        if !(flat_spot_elimination.is_finite() && flat_spot_elimination >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "flat spot elimination must be finite and >= 0, got {flat_spot_elimination}"
            )));
        }
        self.flat_spot_elimination = flat_spot_elimination;
        Ok(self)
    }

    /// `None` uses rayon's global pool, `Some(0)` computes on the calling thread, `Some(n)`
    /// builds a dedicated pool of `n` threads.
    pub fn with_threads(mut self, threads: Option<usize>) -> Result<Self> {
        self.parallelism = match threads {
            None => Parallelism::Global,
            Some(0) => Parallelism::Sequential,
            Some(n) => Parallelism::Pool(ThreadPoolBuilder::new().num_threads(n).build()?),
        };
        Ok(self)
    }

    pub fn cost_function(&self) -> CostFunction {
        self.cost_function
    }

    pub fn regularization(&self) -> f32 {
        self.regularization
    }

    /// Mean cost and mean gradients of `network` over `examples`, regularized if configured.
    pub fn compute(&self, network: &Network, examples: &[TrainingExample]) -> Result<TrainingResult> {
        if examples.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        for example in examples {
            example.check_shape(network)?;
        }
        let sum = match &self.parallelism {
            Parallelism::Sequential => self.sum_sequential(network, examples)?,
            Parallelism::Global => self.sum_parallel(network, examples)?,
            Parallelism::Pool(pool) => pool.install(|| self.sum_parallel(network, examples))?,
        };
        debug_assert_eq!(sum.n_examples, examples.len());
        let n = examples.len() as f32;
        let mut result = TrainingResult {
            cost: sum.cost / n,
            gradients: sum.gradients,
        };
        for gradient in &mut result.gradients {
            *gradient *= 1.0 / n;
        }
        if self.regularization > 0.0 {
            self.regularize(network, &mut result, n);
        }
        trace!(
            n_examples = examples.len(),
            cost = result.cost,
            "computed batch gradient"
        );
        Ok(result)
    }

    fn sum_sequential(
        &self,
        network: &Network,
        examples: &[TrainingExample],
    ) -> Result<BatchAccumulator> {
        let mut sum = BatchAccumulator::zeros(network);
        for example in examples {
            sum = sum.merge(self.example_gradient(network, example)?);
        }
        Ok(sum)
    }

    fn sum_parallel(
        &self,
        network: &Network,
        examples: &[TrainingExample],
    ) -> Result<BatchAccumulator> {
        examples
            .par_iter()
            .try_fold(
                || BatchAccumulator::zeros(network),
                |sum: BatchAccumulator, example| -> Result<BatchAccumulator> {
                    Ok(sum.merge(self.example_gradient(network, example)?))
                },
            )
            .try_reduce(
                || BatchAccumulator::zeros(network),
                |a, b| Ok(a.merge(b)),
            )
    }

    /// Cost and gradients of a single example.
    fn example_gradient(
        &self,
        network: &Network,
        example: &TrainingExample,
    ) -> Result<BatchAccumulator> {
        let results = network.feedforward(example.input())?;
        let layers = network.layers();
        let last = layers.len() - 1;
        let a = results[last].a.as_ref();
        let y = example.expected();
        let cost = self.cost_function.cost(y, a)?;

        let mut gradients: Vec<ErrorGradient> = Vec::with_capacity(last);
        // Output layer: δ = a - y.
        let mut delta = Col::from_fn(a.nrows(), |k| a[k] - y[k]);
        gradients.push(ErrorGradient::from_error(
            delta.as_ref(),
            delta.as_ref(),
            results[last - 1].a.as_ref(),
        ));
        // Hidden layers, back to front.
        for u in (1..last).rev() {
            let back = layers[u].backpropagate(
                &results[u],
                &layers[u + 1],
                delta.as_ref(),
                self.flat_spot_elimination,
            )?;
            gradients.push(ErrorGradient::from_error(
                back.weight_error.as_ref(),
                back.bias_error.as_ref(),
                results[u - 1].a.as_ref(),
            ));
            delta = back.weight_error;
        }
        gradients.reverse();

        Ok(BatchAccumulator {
            cost,
            n_examples: 1,
            gradients,
        })
    }

    /// `C += λ/(2N) Σ w²`, `dW += (λ/N) W`. Biases are left alone.
    fn regularize(&self, network: &Network, result: &mut TrainingResult, n: f32) {
        let lambda = self.regularization;
        let mut sum_w_squared = 0.0f32;
        for (layer, gradient) in network.layers()[1..].iter().zip(&mut result.gradients) {
            let w = layer.w();
            for j in 0..w.ncols() {
                for i in 0..w.nrows() {
                    sum_w_squared += w[(i, j)].powi(2);
                    gradient.dw[(i, j)] += lambda / n * w[(i, j)];
                }
            }
        }
        result.cost += lambda / (2.0 * n) * sum_w_squared;
    }
}

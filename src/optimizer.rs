use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use derive_more::Display;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    CostFunction, Error, ErrorGradient, GradientEngine, Layer, Network, Result, TrainingExample,
    TrainingResult,
};

/// Hyperparameters of [`MomentumOptimizer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f32,
    pub momentum: f32,
    /// L2 regularization strength λ.
    pub regularization: f32,
    /// Convergence is not checked before this iteration.
    pub min_iterations: usize,
    pub max_iterations: usize,
    /// Training has converged once the cost drops by no more than this in one iteration.
    pub cost_epsilon: f32,
    /// Added to hidden layers' transfer derivatives.
    pub flat_spot_elimination: f32,
    pub cost_function: CostFunction,
    /// See [`GradientEngine::with_threads`].
    pub threads: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            momentum: 0.8,
            regularization: 0.0,
            min_iterations: 1,
            max_iterations: 2000,
            cost_epsilon: 1e-7,
            flat_spot_elimination: 0.1,
            cost_function: CostFunction::SumSquaredError,
            threads: None,
        }
    }
}

fn check_non_negative(name: &str, value: f32) -> Result<()> {
    match value.is_finite() && value >= 0.0 {
        true => Ok(()),
        false => Err(Error::InvalidConfig(format!(
            "{name} must be finite and >= 0, got {value}"
        ))),
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("learning rate", self.learning_rate)?;
        check_non_negative("momentum", self.momentum)?;
        check_non_negative("regularization", self.regularization)?;
        check_non_negative("cost epsilon", self.cost_epsilon)?;
        check_non_negative("flat spot elimination", self.flat_spot_elimination)?;
        if self.min_iterations == 0 || self.max_iterations == 0 {
            return Err(Error::InvalidConfig(format!(
                "iteration bounds must be > 0, got min {} and max {}",
                self.min_iterations, self.max_iterations
            )));
        }
        if self.min_iterations > self.max_iterations {
            return Err(Error::InvalidConfig(format!(
                "min iterations ({}) exceeds max iterations ({})",
                self.min_iterations, self.max_iterations
            )));
        }
        Ok(())
    }
}

/// Why training stopped.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStop {
    #[display("maximum number of iterations reached")]
    MaxIterationsReached,
    #[display("cost converged")]
    EpsilonReached,
    #[display("cancelled")]
    Cancelled,
}

#[derive(Debug, Display, Clone, Copy, PartialEq)]
#[display("iteration {iteration}: cost = {cost}")]
pub struct TrainingProgress {
    pub iteration: usize,
    pub cost: f32,
}

/// Shared flag for stopping a training run from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

/// Batch gradient descent with momentum.
///
/// Each iteration computes the cost and gradients over the whole training set, then moves every
/// layer by `Δ = η ∇ + μ Δ_previous`.
#[derive(Debug)]
pub struct MomentumOptimizer {
    config: TrainingConfig,
    engine: GradientEngine,
}

impl MomentumOptimizer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        let engine = GradientEngine::from_config(&config)?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn engine(&self) -> &GradientEngine {
        &self.engine
    }

    pub fn train(&self, network: &mut Network, examples: &[TrainingExample]) -> Result<TrainingStop> {
        self.train_with(network, examples, None, None)
    }

    /// Trains `network` in place until it converges, runs out of iterations, or `cancel` fires.
    ///
    /// `progress` is called after every committed weight update. Once cancellation is observed
    /// no further update is applied. A NaN or infinite cost aborts with [`Error::Diverged`].
    pub fn train_with(
        &self,
        network: &mut Network,
        examples: &[TrainingExample],
        mut progress: Option<&mut dyn FnMut(TrainingProgress)>,
        cancel: Option<&CancellationToken>,
    ) -> Result<TrainingStop> {
        if examples.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        let TrainingConfig {
            min_iterations,
            max_iterations,
            cost_epsilon,
            ..
        } = self.config;
        let mut previous_deltas: Vec<ErrorGradient> = network.layers()[1..]
            .iter()
            .map(ErrorGradient::zeros_like)
            .collect();
        let mut last_cost = f32::INFINITY;
        for iteration in 0..max_iterations {
            if is_cancelled(cancel) {
                return Ok(self.stop(TrainingStop::Cancelled, iteration, last_cost));
            }
            let TrainingResult { cost, gradients } = self.engine.compute(network, examples)?;
            let cost_delta = last_cost - cost;
            if iteration >= min_iterations && (0.0..=cost_epsilon).contains(&cost_delta) {
                return Ok(self.stop(TrainingStop::EpsilonReached, iteration, cost));
            }
            if !cost.is_finite() {
                warn!(iteration, cost, "cost diverged");
                return Err(Error::Diverged { iteration, cost });
            }
            if is_cancelled(cancel) {
                return Ok(self.stop(TrainingStop::Cancelled, iteration, last_cost));
            }
            self.update(network, &gradients, &mut previous_deltas);
            debug!(
                iteration,
                cost,
                cost_delta,
                gradient_norm = gradients.iter().map(ErrorGradient::norm_squared).sum::<f32>().sqrt(),
                "iteration finished"
            );
            if let Some(progress) = progress.as_deref_mut() {
                progress(TrainingProgress { iteration, cost });
            }
            last_cost = cost;
        }
        Ok(self.stop(TrainingStop::MaxIterationsReached, max_iterations, last_cost))
    }

    fn stop(&self, reason: TrainingStop, iteration: usize, cost: f32) -> TrainingStop {
        match reason {
            TrainingStop::Cancelled => warn!(iteration, "training cancelled"),
            _ => info!(iteration, cost, %reason, "training finished"),
        }
        reason
    }

    /// Applies one momentum step to every non-input layer. Layers are disjoint, so they are
    /// updated in parallel.
    fn update(
        &self,
        network: &mut Network,
        gradients: &[ErrorGradient],
        previous_deltas: &mut [ErrorGradient],
    ) {
        let (eta, mu) = (self.config.learning_rate, self.config.momentum);
        network.layers_mut()[1..]
            .par_iter_mut()
            .zip(gradients.par_iter())
            .zip(previous_deltas.par_iter_mut())
            .for_each(|((layer, gradient), previous)| {
                update_layer(layer, gradient, previous, eta, mu)
            });
    }
}

fn update_layer(
    layer: &mut Layer,
    gradient: &ErrorGradient,
    previous: &mut ErrorGradient,
    eta: f32,
    mu: f32,
) {
    let mut w = layer.w_mut();
    for j in 0..w.ncols() {
        for i in 0..w.nrows() {
            let delta = eta * gradient.dw[(i, j)] + mu * previous.dw[(i, j)];
            w[(i, j)] -= delta;
            previous.dw[(i, j)] = delta;
        }
    }
    let mut b = layer.b_mut();
    for k in 0..b.nrows() {
        let delta = eta * gradient.db[k] + mu * previous.db[k];
        b[k] -= delta;
        previous.db[k] = delta;
    }
}

use faer::prelude::*;
use rand::{Rng, distr::uniform::SampleRange, rngs::ThreadRng};

use crate::{
    CostFunction, Error, FeedforwardResult, Layer, LayerKind, Result, TrainingExample,
    TransferFunction, error::check_len,
};

#[derive(Debug, Clone)]
pub struct Topology {
    n_inputs: usize,
    layer_descriptions: Vec<LayerDescription>,
}

impl Topology {
    /// `layer_descriptions` lists every non-input layer; the last one is the output layer.
    pub fn new(n_inputs: usize, layer_descriptions: Vec<LayerDescription>) -> Self {
        Self {
            n_inputs,
            layer_descriptions,
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    pub fn n_outputs(&self) -> usize {
        self.layer_descriptions()
            .last()
            .map_or(self.n_inputs, |last_layer| last_layer.n_neurons)
    }

    pub fn layer_descriptions(&self) -> &[LayerDescription] {
        &self.layer_descriptions
    }

    /// Number of layers including the input layer.
    pub fn n_layers(&self) -> usize {
        self.layer_descriptions().len() + 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LayerDescription {
    pub n_neurons: usize,
    pub phi: TransferFunction,
}

impl LayerDescription {
    pub fn new(n_neurons: usize, phi: TransferFunction) -> Self {
        Self { n_neurons, phi }
    }
}

/// A feed-forward network: an input layer, zero or more hidden layers, and an output layer.
///
/// Layers are addressed by index, `0` being the input layer. The structure is fixed once built;
/// only weights and biases change.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Network {
    /// Builds a zero-initialised network.
    pub fn new(topology: &Topology) -> Result<Self> {
        if topology.n_inputs() == 0 {
            return Err(Error::InvalidConfig(
                "network must have at least one input".into(),
            ));
        }
        if topology.layer_descriptions().is_empty() {
            return Err(Error::InvalidConfig(
                "network must have at least one non-input layer".into(),
            ));
        }
        let n_described = topology.layer_descriptions().len();
        let mut layers = Vec::with_capacity(topology.n_layers());
        layers.push(Layer::input(topology.n_inputs()));
        let mut n_previous = topology.n_inputs();
        for (i, description) in topology.layer_descriptions().iter().enumerate() {
            let kind = match i + 1 == n_described {
                true => LayerKind::Output,
                false => LayerKind::Hidden,
            };
            layers.push(Layer::new(
                kind,
                description.n_neurons,
                n_previous,
                description.phi,
            )?);
            n_previous = description.n_neurons;
        }
        Ok(Self { layers })
    }

    /// Assembles a network from already built layers, checking the structural invariants.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        if layers.len() < 2 {
            return Err(Error::InvalidConfig(format!(
                "network needs at least 2 layers, got {}",
                layers.len()
            )));
        }
        let last = layers.len() - 1;
        for (u, layer) in layers.iter().enumerate() {
            let expected_kind = match u {
                0 => LayerKind::Input,
                u if u == last => LayerKind::Output,
                _ => LayerKind::Hidden,
            };
            if layer.kind() != expected_kind {
                return Err(Error::InvalidConfig(format!(
                    "layer {u} must be an {expected_kind} layer, got {}",
                    layer.kind()
                )));
            }
            if u > 0 {
                check_len("layer inputs", layers[u - 1].n(), layer.n_previous())?;
            }
        }
        Ok(Self { layers })
    }

    pub fn n_inputs(&self) -> usize {
        self.layers[0].n()
    }

    pub fn n_outputs(&self) -> usize {
        self.output_layer().n()
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Weights and bias of layer `index`, writable in place. Shapes, kinds and transfer functions
    /// stay fixed. `None` for the input layer, which has no parameters, and past the output layer.
    pub fn params_mut(&mut self, index: usize) -> Option<(MatMut<'_, f32>, ColMut<'_, f32>)> {
        match index {
            0 => None,
            _ => self.layers.get_mut(index).map(Layer::params_mut),
        }
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    pub fn topology(&self) -> Topology {
        Topology::new(
            self.n_inputs(),
            self.layers[1..]
                .iter()
                .map(|layer| LayerDescription::new(layer.n(), layer.phi()))
                .collect(),
        )
    }

    pub fn n_params(&self) -> usize {
        self.layers.iter().map(Layer::n_params).sum()
    }

    /// Per-layer forward results, input layer first.
    pub fn feedforward(&self, input: ColRef<f32>) -> Result<Vec<FeedforwardResult>> {
        let mut results: Vec<FeedforwardResult> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let a_prev = match results.last() {
                None => input,
                Some(previous) => previous.a.as_ref(),
            };
            let result = layer.feedforward(a_prev)?;
            results.push(result);
        }
        debug_assert!(
            (0..input.nrows()).all(|k| results[0].a[k].to_bits() == input[k].to_bits()),
            "input layer must pass its input through unchanged"
        );
        Ok(results)
    }

    /// Output activations for `input`.
    pub fn evaluate(&self, input: &[f32]) -> Result<Vec<f32>> {
        let results = self.feedforward(ColRef::from_slice(input))?;
        let a = &results[results.len() - 1].a;
        Ok((0..a.nrows()).map(|k| a[k]).collect())
    }

    /// Mean cost over `examples`, without regularization.
    pub fn cost(&self, cost_function: CostFunction, examples: &[TrainingExample]) -> Result<f32> {
        if examples.is_empty() {
            return Err(Error::EmptyTrainingSet);
        }
        let mut cost = 0.0f32;
        for example in examples {
            let results = self.feedforward(example.input())?;
            let a = results[results.len() - 1].a.as_ref();
            cost += cost_function.cost(example.expected(), a)?;
        }
        Ok(cost / examples.len() as f32)
    }

    pub fn randomize_params(&mut self, range: impl SampleRange<f32> + Clone) {
        let mut rng = ThreadRng::default();
        self.randomize_params_with(&mut rng, range);
    }

    pub fn randomize_params_with<R: Rng>(
        &mut self,
        rng: &mut R,
        range: impl SampleRange<f32> + Clone,
    ) {
        for layer in &mut self.layers[1..] {
            let mut w = layer.w_mut();
            for j in 0..w.ncols() {
                for i in 0..w.nrows() {
                    w[(i, j)] = rng.random_range(range.clone());
                }
            }
            let mut b = layer.b_mut();
            for k in 0..b.nrows() {
                b[k] = rng.random_range(range.clone());
            }
        }
    }

    /// All weights and biases, layer by layer, weights row-major then bias.
    pub fn params_to_vec(&self) -> Vec<f32> {
        let mut params = Vec::with_capacity(self.n_params());
        for layer in &self.layers[1..] {
            let w = layer.w();
            for i in 0..w.nrows() {
                for j in 0..w.ncols() {
                    params.push(w[(i, j)]);
                }
            }
            let b = layer.b();
            params.extend((0..b.nrows()).map(|k| b[k]));
        }
        params
    }

    /// Inverse of [`Network::params_to_vec`].
    pub fn load_params(&mut self, params: &[f32]) -> Result<()> {
        check_len("parameter buffer", self.n_params(), params.len())?;
        let mut params = params.iter().copied();
        for layer in &mut self.layers[1..] {
            let mut w = layer.w_mut();
            for i in 0..w.nrows() {
                for j in 0..w.ncols() {
                    w[(i, j)] = params.next().unwrap_or_default();
                }
            }
            let mut b = layer.b_mut();
            for k in 0..b.nrows() {
                b[k] = params.next().unwrap_or_default();
            }
        }
        Ok(())
    }
}

//! Persisted network architecture.
//!
//! A [`NetworkRecord`] is the serializable shape of a [`Network`]: neuron counts per layer
//! (input first) plus the parameters of each hidden layer and of the output layer. Weights are
//! stored flat in row-major order, one row per neuron.

use faer::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Error, Layer, LayerKind, Network, Result, TransferFunction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub neuron_counts: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_layers: Option<Vec<LayerRecord>>,
    pub output_layer: LayerRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    pub inputs: usize,
    pub outputs: usize,
    pub bias: Vec<f32>,
    pub weights: Vec<f32>,
    /// Defaults to sigmoid when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferFunction>,
}

impl LayerRecord {
    fn from_layer(layer: &Layer) -> Self {
        let w = layer.w();
        let b = layer.b();
        let mut weights = Vec::with_capacity(w.nrows() * w.ncols());
        for i in 0..w.nrows() {
            for j in 0..w.ncols() {
                weights.push(w[(i, j)]);
            }
        }
        Self {
            inputs: layer.n_previous(),
            outputs: layer.n(),
            bias: (0..b.nrows()).map(|k| b[k]).collect(),
            weights,
            transfer: Some(layer.phi()),
        }
    }

    fn to_layer(&self, kind: LayerKind) -> Result<Layer> {
        if self.bias.len() != self.outputs {
            return Err(Error::InvalidRecord(format!(
                "bias has {} entries, expected {}",
                self.bias.len(),
                self.outputs
            )));
        }
        if self.weights.len() != self.inputs * self.outputs {
            return Err(Error::InvalidRecord(format!(
                "weights have {} entries, expected {} x {}",
                self.weights.len(),
                self.outputs,
                self.inputs
            )));
        }
        let w = Mat::from_fn(self.outputs, self.inputs, |i, j| {
            self.weights[i * self.inputs + j]
        });
        let b = Col::from_fn(self.outputs, |k| self.bias[k]);
        let phi = self.transfer.unwrap_or(TransferFunction::Sigmoid);
        Layer::from_parts(kind, w, b, phi)
    }
}

impl NetworkRecord {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidRecord(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::InvalidRecord(e.to_string()))
    }
}

impl Network {
    pub fn to_record(&self) -> NetworkRecord {
        let layers = self.layers();
        let last = layers.len() - 1;
        let hidden: Vec<LayerRecord> = layers[1..last].iter().map(LayerRecord::from_layer).collect();
        NetworkRecord {
            neuron_counts: layers.iter().map(Layer::n).collect(),
            hidden_layers: (!hidden.is_empty()).then_some(hidden),
            output_layer: LayerRecord::from_layer(&layers[last]),
        }
    }

    pub fn from_record(record: &NetworkRecord) -> Result<Self> {
        let hidden = record.hidden_layers.as_deref().unwrap_or_default();
        let n_layers = hidden.len() + 2;
        if record.neuron_counts.len() != n_layers {
            return Err(Error::InvalidRecord(format!(
                "{} neuron counts for {n_layers} layers",
                record.neuron_counts.len()
            )));
        }
        let mut layers = Vec::with_capacity(n_layers);
        layers.push(Layer::input(record.neuron_counts[0]));
        let with_kind = hidden
            .iter()
            .map(|r| (r, LayerKind::Hidden))
            .chain([(&record.output_layer, LayerKind::Output)]);
        for (u, (layer_record, kind)) in with_kind.enumerate() {
            let (n_previous, n) = (record.neuron_counts[u], record.neuron_counts[u + 1]);
            if layer_record.inputs != n_previous || layer_record.outputs != n {
                return Err(Error::InvalidRecord(format!(
                    "layer {} is {}x{}, neuron counts say {n}x{n_previous}",
                    u + 1,
                    layer_record.outputs,
                    layer_record.inputs
                )));
            }
            layers.push(layer_record.to_layer(kind)?);
        }
        Network::from_layers(layers)
    }
}

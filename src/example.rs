use faer::prelude::*;

use crate::{Error, Network, Result, error::check_len};

/// One labelled sample: an input vector and the output the network should produce for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    input: Vec<f32>,
    expected: Vec<f32>,
}

impl TrainingExample {
    pub fn new(input: impl Into<Vec<f32>>, expected: impl Into<Vec<f32>>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
        }
    }

    /// Splits an interleaved buffer of `[x_0.., y_0.., x_1.., y_1.., ...]` samples.
    pub fn from_flat(samples: &[f32], n_inputs: usize, n_outputs: usize) -> Result<Vec<Self>> {
        let stride = n_inputs + n_outputs;
        if stride == 0 || samples.len() % stride != 0 {
            return Err(Error::InvalidConfig(format!(
                "sample buffer of length {} is not a multiple of {n_inputs} + {n_outputs}",
                samples.len()
            )));
        }
        Ok(samples
            .chunks(stride)
            .map(|sample| Self::new(&sample[..n_inputs], &sample[n_inputs..]))
            .collect())
    }

    pub fn input(&self) -> ColRef<'_, f32> {
        ColRef::from_slice(&self.input)
    }

    pub fn expected(&self) -> ColRef<'_, f32> {
        ColRef::from_slice(&self.expected)
    }

    pub fn input_slice(&self) -> &[f32] {
        &self.input
    }

    pub fn expected_slice(&self) -> &[f32] {
        &self.expected
    }

    pub fn check_shape(&self, network: &Network) -> Result<()> {
        check_len("example input", network.n_inputs(), self.input.len())?;
        check_len("example expected output", network.n_outputs(), self.expected.len())
    }
}

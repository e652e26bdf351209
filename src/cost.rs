use derive_more::Display;
use faer::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Result, error::check_len};

/// Scalar training cost of one example.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFunction {
    /// `0.5 * Σ (y - a)²`.
    #[default]
    #[display("sum squared error")]
    SumSquaredError,
    /// `-Σ [y ln(a) + (1 - y) ln(1 - a)]`.
    ///
    /// Not guarded: an output component of exactly 0 or 1 makes this infinite or NaN. Pair it
    /// with an output activation that stays inside (0, 1) (sigmoid, or the epsilon-guarded step).
    /// The optimizer reports such a cost as divergence.
    #[display("logistic")]
    Logistic,
}

impl CostFunction {
    pub fn cost(self, expected: ColRef<f32>, actual: ColRef<f32>) -> Result<f32> {
        check_len("cost actual output", expected.nrows(), actual.nrows())?;
        let cost = match self {
            CostFunction::SumSquaredError => {
                let mut sum = 0.0f32;
                for k in 0..expected.nrows() {
                    sum += (expected[k] - actual[k]).powi(2);
                }
                0.5 * sum
            }
            CostFunction::Logistic => {
                let mut sum = 0.0f32;
                for k in 0..expected.nrows() {
                    let (y, a) = (expected[k], actual[k]);
                    sum += y * a.ln() + (1.0 - y) * (1.0 - a).ln();
                }
                -sum
            }
        };
        Ok(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(f: CostFunction, y: &[f32], a: &[f32]) -> Result<f32> {
        f.cost(ColRef::from_slice(y), ColRef::from_slice(a))
    }

    #[test]
    fn sum_squared_error_is_zero_only_on_match() {
        let f = CostFunction::SumSquaredError;
        assert_eq!(cost(f, &[0.3, -1.0, 2.0], &[0.3, -1.0, 2.0]).unwrap(), 0.0);
        let c = cost(f, &[0.0, 1.0], &[1.0, 3.0]).unwrap();
        assert_eq!(c, 0.5 * (1.0 + 4.0));
        for (y, a) in [(0.1f32, 0.2f32), (-4.0, 3.0), (1e3, -1e3)] {
            assert!(cost(f, &[y], &[a]).unwrap() > 0.0);
        }
    }

    #[test]
    fn logistic_cost() {
        let f = CostFunction::Logistic;
        let c = cost(f, &[1.0, 0.0], &[0.5, 0.25]).unwrap();
        let expected = -(0.5f32.ln() + 0.75f32.ln());
        assert!((c - expected).abs() < 1e-6);
    }

    #[test]
    fn logistic_cost_blows_up_on_saturated_output() {
        let f = CostFunction::Logistic;
        assert!(cost(f, &[1.0], &[0.0]).unwrap().is_infinite());
        assert!(cost(f, &[0.0], &[0.0]).unwrap().is_nan());
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let f = CostFunction::SumSquaredError;
        assert!(cost(f, &[1.0, 2.0], &[1.0]).is_err());
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("shape mismatch in {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("cost evaluated to {cost} at iteration {iteration}")]
    Diverged { iteration: usize, cost: f32 },
    #[error("invalid network record: {0}")]
    InvalidRecord(String),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returns `ShapeMismatch` unless `actual == expected`.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    match expected == actual {
        true => Ok(()),
        false => Err(Error::ShapeMismatch {
            what,
            expected,
            actual,
        }),
    }
}

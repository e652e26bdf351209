use std::{thread, time::Duration};

use mlp_trainer::{
    CancellationToken, LayerDescription, MomentumOptimizer, Network, Topology, TrainingConfig,
    TrainingExample, TrainingProgress, TrainingStop, TransferFunction,
};
use rand::{SeedableRng, rngs::StdRng};

fn setup() -> (Network, Vec<TrainingExample>) {
    let topology = Topology::new(
        2,
        vec![
            LayerDescription::new(2, TransferFunction::Sigmoid),
            LayerDescription::new(1, TransferFunction::Sigmoid),
        ],
    );
    let mut nn = Network::new(&topology).unwrap();
    nn.randomize_params_with(&mut StdRng::seed_from_u64(7), -1.0..1.0);
    let examples = TrainingExample::from_flat(
        &[
            0., 0., 0., //
            0., 1., 1., //
            1., 0., 1., //
            1., 1., 0., //
        ],
        2,
        1,
    )
    .unwrap();
    (nn, examples)
}

/// Never converges, so only cancellation or the iteration bound stops it.
fn optimizer(max_iterations: usize) -> MomentumOptimizer {
    MomentumOptimizer::new(TrainingConfig {
        min_iterations: max_iterations,
        max_iterations,
        threads: Some(0),
        ..TrainingConfig::default()
    })
    .unwrap()
}

#[test]
fn cancelled_before_start_leaves_weights_untouched() {
    let (mut nn, examples) = setup();
    let initial = nn.params_to_vec();
    let token = CancellationToken::new();
    token.cancel();
    let mut n_reports = 0;
    let mut count = |_: TrainingProgress| n_reports += 1;
    let stop = optimizer(2000)
        .train_with(&mut nn, &examples, Some(&mut count), Some(&token))
        .unwrap();
    assert_eq!(stop, TrainingStop::Cancelled);
    assert_eq!(n_reports, 0);
    assert_eq!(nn.params_to_vec(), initial);
}

#[test]
fn cancelling_mid_run_keeps_last_committed_update() {
    let (mut nn, examples) = setup();
    let mut reference = nn.clone();

    let token = CancellationToken::new();
    let mut last_iteration = None;
    let mut cancel_at_five = |progress: TrainingProgress| {
        last_iteration = Some(progress.iteration);
        if progress.iteration == 5 {
            token.cancel();
        }
    };
    let stop = optimizer(2000)
        .train_with(&mut nn, &examples, Some(&mut cancel_at_five), Some(&token))
        .unwrap();
    assert_eq!(stop, TrainingStop::Cancelled);
    assert_eq!(last_iteration, Some(5));

    // Six updates (iterations 0 through 5) were committed.
    let stop = optimizer(6).train(&mut reference, &examples).unwrap();
    assert_eq!(stop, TrainingStop::MaxIterationsReached);
    assert_eq!(nn.params_to_vec(), reference.params_to_vec());
}

#[test]
fn cancel_from_another_thread() {
    let (mut nn, examples) = setup();
    let token = CancellationToken::new();
    let optimizer = optimizer(usize::MAX);
    let stop = thread::scope(|s| {
        let canceller = token.clone();
        s.spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });
        optimizer.train_with(&mut nn, &examples, None, Some(&token))
    })
    .unwrap();
    assert_eq!(stop, TrainingStop::Cancelled);
    assert!(token.is_cancelled());
    assert!(nn.params_to_vec().iter().all(|p| p.is_finite()));
}

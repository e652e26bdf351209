use mlp_trainer::{
    CostFunction, Error, Layer, LayerDescription, LayerKind, MomentumOptimizer, Network, Topology,
    TrainingConfig, TrainingExample, TrainingProgress, TrainingStop, TransferFunction,
    faer::prelude::*,
};
use rand::{SeedableRng, rngs::StdRng};

fn xor() -> Vec<TrainingExample> {
    vec![
        TrainingExample::new([0.0f32, 0.0], [0.0f32]),
        TrainingExample::new([0.0f32, 1.0], [1.0f32]),
        TrainingExample::new([1.0f32, 0.0], [1.0f32]),
        TrainingExample::new([1.0f32, 1.0], [0.0f32]),
    ]
}

fn labels_match(nn: &Network, examples: &[TrainingExample]) -> bool {
    examples.iter().all(|example| {
        let a = nn.evaluate(example.input_slice()).unwrap();
        (a[0] - example.expected_slice()[0]).abs() < 0.1
    })
}

fn config() -> TrainingConfig {
    TrainingConfig {
        learning_rate: 0.5,
        momentum: 0.8,
        max_iterations: 2000,
        ..TrainingConfig::default()
    }
}

fn network(seed: u64, n_hidden: usize, output: TransferFunction) -> Network {
    let topology = Topology::new(
        2,
        vec![
            LayerDescription::new(n_hidden, TransferFunction::Sigmoid),
            LayerDescription::new(1, output),
        ],
    );
    let mut nn = Network::new(&topology).unwrap();
    nn.randomize_params_with(&mut StdRng::seed_from_u64(seed), -1.0..1.0);
    nn
}

/// `None` when the cost diverged.
fn train(nn: &mut Network, config: TrainingConfig) -> Option<TrainingStop> {
    let optimizer = MomentumOptimizer::new(config).unwrap();
    match optimizer.train(nn, &xor()) {
        Ok(stop) => Some(stop),
        Err(Error::Diverged { .. }) => None,
        Err(e) => panic!("training failed: {e}"),
    }
}

/// Same parameters, with the output transfer function replaced by a step.
fn with_step_output(nn: &Network) -> Network {
    let output = nn.output_layer();
    let step = Layer::from_parts(
        LayerKind::Output,
        Mat::from_fn(output.n(), output.n_previous(), |i, j| output.w()[(i, j)]),
        Col::from_fn(output.n(), |k| output.b()[k]),
        TransferFunction::Step,
    )
    .unwrap();
    let mut layers = nn.layers().to_vec();
    *layers.last_mut().unwrap() = step;
    Network::from_layers(layers).unwrap()
}

#[test]
fn two_hidden_sigmoids_learn_xor_in_most_runs() {
    let examples = xor();
    let mut n_learned = 0;
    for seed in 0..20 {
        let mut nn = network(seed, 2, TransferFunction::Sigmoid);
        let stop = train(&mut nn, config()).unwrap();
        assert_ne!(stop, TrainingStop::Cancelled);
        if labels_match(&with_step_output(&nn), &examples) {
            n_learned += 1;
        }
    }
    assert!(n_learned >= 12, "only {n_learned} of 20 runs learned XOR");
}

#[test]
fn wider_hidden_layer_learns_xor_with_logistic_cost() {
    let examples = xor();
    let config = TrainingConfig {
        cost_function: CostFunction::Logistic,
        ..config()
    };
    let mut n_learned = 0;
    for seed in 0..10 {
        let mut nn = network(seed, 4, TransferFunction::Sigmoid);
        if train(&mut nn, config).is_some() && labels_match(&nn, &examples) {
            n_learned += 1;
        }
    }
    assert!(n_learned >= 8, "only {n_learned} of 10 runs learned XOR");
}

#[test]
fn trained_network_classifies_through_a_step_output() {
    let examples = xor();
    let nn = (0..10)
        .map(|seed| {
            let mut nn = network(seed, 4, TransferFunction::Sigmoid);
            train(&mut nn, config());
            nn
        })
        .find(|nn| labels_match(nn, &examples))
        .expect("no run learned XOR");
    assert!(labels_match(&with_step_output(&nn), &examples));
}

/// A step output's cost only moves when a label flips, so the first update that flips nothing
/// looks converged.
#[test]
fn step_output_trained_directly_stops_early() {
    for seed in 0..20 {
        let mut nn = network(seed, 2, TransferFunction::Step);
        let optimizer = MomentumOptimizer::new(config()).unwrap();
        let mut n_reports = 0;
        let mut count = |_: TrainingProgress| n_reports += 1;
        let stop = optimizer
            .train_with(&mut nn, &xor(), Some(&mut count), None)
            .unwrap();
        assert_eq!(stop, TrainingStop::EpsilonReached, "seed {seed}");
        assert!((1..=50).contains(&n_reports), "seed {seed}: {n_reports} updates");
    }
}

/// `a_1 = [OR, AND]`, output is `OR and not AND`.
fn hand_crafted_step_network() -> Network {
    let hidden = Layer::from_parts(
        LayerKind::Hidden,
        Mat::from_fn(2, 2, |_, _| 20.0f32),
        Col::from_fn(2, |k| [-10.0f32, -30.0][k]),
        TransferFunction::Sigmoid,
    )
    .unwrap();
    let output = Layer::from_parts(
        LayerKind::Output,
        Mat::from_fn(1, 2, |_, j| [20.0f32, -20.0][j]),
        Col::from_fn(1, |_| -10.0f32),
        TransferFunction::Step,
    )
    .unwrap();
    Network::from_layers(vec![Layer::input(2), hidden, output]).unwrap()
}

#[test]
fn step_output_network_settles_once_every_label_is_right() {
    let examples = xor();
    let mut nn = hand_crafted_step_network();
    assert!(labels_match(&nn, &examples));

    let optimizer = MomentumOptimizer::new(config()).unwrap();
    let mut n_reports = 0;
    let mut count = |_: TrainingProgress| n_reports += 1;
    let stop = optimizer
        .train_with(&mut nn, &examples, Some(&mut count), None)
        .unwrap();
    assert_eq!(stop, TrainingStop::EpsilonReached);
    assert_eq!(n_reports, 1);
    assert!(labels_match(&nn, &examples));
    for example in &examples {
        let a = nn.evaluate(example.input_slice()).unwrap()[0];
        assert!(a.round() == example.expected_slice()[0]);
        assert!((a - 0.5).abs() >= 0.4);
    }
}

//! Trains a 2-2-1 network on XOR with the momentum optimizer.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use mlp_trainer::{
    Error, LayerDescription, MomentumOptimizer, Network, Topology, TrainingConfig,
    TrainingExample, TrainingProgress, TransferFunction,
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mlp-trainer")]
#[command(about = "Train a small multi-layer perceptron on XOR", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON file with training hyperparameters
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    learning_rate: Option<f32>,

    #[arg(long)]
    momentum: Option<f32>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Worker threads for gradient computation, 0 for sequential
    #[arg(short, long, default_value_t = num_cpus::get())]
    threads: usize,

    /// Print progress every this many iterations
    #[arg(long, default_value = "100")]
    log_every: usize,

    /// Initial parameters are drawn uniformly from (-init, init)
    #[arg(long, default_value = "1.0")]
    init: f32,

    /// Write the trained network as JSON
    #[arg(long)]
    save_json: Option<PathBuf>,

    /// Write the trained parameters as raw f32 bytes
    #[arg(long)]
    save_params: Option<PathBuf>,

    /// Start from raw f32 parameters instead of random ones
    #[arg(long)]
    load_params: Option<PathBuf>,
}

fn time<T>(f: impl FnOnce() -> T) -> (Duration, T) {
    let before = Instant::now();
    let result = f();
    let after = Instant::now();
    (after.duration_since(before), result)
}

fn load_config(cli: &Cli) -> Result<TrainingConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => TrainingConfig {
            min_iterations: 100,
            max_iterations: 5000,
            ..TrainingConfig::default()
        },
    };
    if let Some(learning_rate) = cli.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(momentum) = cli.momentum {
        config.momentum = momentum;
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations;
        config.min_iterations = config.min_iterations.min(max_iterations);
    }
    config.threads = Some(cli.threads);
    Ok(config)
}

fn load_params(nn: &mut Network, path: &Path) -> Result<()> {
    let bytes = fs::read(path)?;
    if bytes.len() % size_of::<f32>() != 0 {
        bail!("{} is not a whole number of f32s", path.display());
    }
    let params: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
    nn.load_params(&params)?;
    Ok(())
}

fn dump_params(nn: &Network, path: &Path) -> Result<()> {
    let params = nn.params_to_vec();
    let bytes: &[u8] = bytemuck::cast_slice(&params);
    fs::write(path, bytes)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;
    let optimizer = MomentumOptimizer::new(config)?;

    let samples = TrainingExample::from_flat(
        &[
            0., 0., 0., //
            1., 0., 1., //
            0., 1., 1., //
            1., 1., 0., //
        ],
        2,
        1,
    )?;

    let topology = Topology::new(
        2, // n_inputs
        vec![
            LayerDescription::new(2, TransferFunction::Sigmoid),
            LayerDescription::new(1, TransferFunction::Sigmoid),
        ],
    );
    let mut nn = Network::new(&topology)?;

    match &cli.load_params {
        Some(path) => {
            load_params(&mut nn, path)
                .with_context(|| format!("loading parameters from {}", path.display()))?;
            println!("Loaded parameters from {}", path.display());
        }
        None => {
            if !(cli.init.is_finite() && cli.init > 0.0) {
                bail!("--init must be positive, got {}", cli.init);
            }
            println!("Training from scratch");
            nn.randomize_params(-cli.init..cli.init);
        }
    }

    info!(threads = cli.threads, ?config, "training");
    let log_every = cli.log_every.max(1);
    let report: &mut dyn FnMut(TrainingProgress) = &mut |progress| {
        if progress.iteration % log_every == 0 {
            println!("{progress}");
        }
    };
    let (training_duration, stop) =
        time(|| optimizer.train_with(&mut nn, &samples, Some(report), None));
    // Diverged runs keep their last committed weights.
    let stop = match stop {
        Ok(stop) => stop.to_string(),
        Err(Error::Diverged { iteration, cost }) => {
            format!("cost diverged to {cost} at iteration {iteration}")
        }
        Err(e) => return Err(e.into()),
    };
    println!("training stopped ({stop}) after {training_duration:?}");
    println!("final cost: {}", nn.cost(config.cost_function, &samples)?);

    // Print parameters.
    for (i_layer, layer) in nn.layers().iter().enumerate().skip(1) {
        println!("=== Layer #{i_layer} ===\n\n{}\n", layer.pretty_print(i_layer));
    }

    // Print results.
    for (i, sample) in samples.iter().enumerate() {
        let a_i = nn.evaluate(sample.input_slice())?;
        println!(
            "[i = {i}] expected: {:?} => {:?}, result: {a_i:?}",
            sample.input_slice(),
            sample.expected_slice(),
        );
    }

    if let Some(path) = &cli.save_json {
        fs::write(path, nn.to_record().to_json()?)?;
        println!("Saved network to {}", path.display());
    }
    if let Some(path) = &cli.save_params {
        dump_params(&nn, path)?;
        println!("Saved parameters to {}", path.display());
    }

    Ok(())
}

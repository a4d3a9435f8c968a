use std::env;
use std::process;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format;

use mlp::{Activation, Adam, LayerSpec, Loss, Matrix, Network, NetworkError, Topology, TrainingConfig};

const SEED: u64 = 2020;
const REPORT_EVERY: usize = 100;

fn main() {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }

    let event_format = format().with_target(false).without_time();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .event_format(event_format)
        .init();

    // An optional path to save the trained model to.
    let output = env::args().nth(1);

    if let Err(error) = run(output) {
        error!(%error, "Training failed.");
        process::exit(1);
    }
}

fn run(output: Option<String>) -> Result<(), NetworkError> {
    let inputs = Matrix::from_rows(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]])?;
    let labels = Matrix::from_rows(&[[0.0], [1.0], [1.0], [0.0]])?;

    let topology = Topology {
        inputs: 2,
        layers: vec![
            LayerSpec::new(8, Activation::Tanh),
            LayerSpec::new(1, Activation::Sigmoid),
        ],
        loss: Loss::MeanSquaredError,
    };

    let mut rng = StdRng::seed_from_u64(SEED);
    let mut network = Network::random(&topology, &mut rng)?;

    let config = TrainingConfig {
        epochs: 1000,
        learning_rate: 0.01,
        batch_size: 4,
        ..Default::default()
    };

    let losses = network.train_with(&inputs, &labels, &config, &mut Adam::default(), &mut rng)?;

    for (epoch, loss) in losses.iter().enumerate().skip(REPORT_EVERY - 1).step_by(REPORT_EVERY) {
        info!(epoch = epoch + 1, loss, "Training progress.");
    }

    let outputs = network.predict(&inputs)?;
    for (sample, output) in inputs.iter_rows().zip(outputs.iter_rows()) {
        info!(?sample, ?output, "Prediction.");
    }

    if let Some(path) = output {
        network.save(&path)?;
        info!(%path, "Model saved.");
    }

    Ok(())
}

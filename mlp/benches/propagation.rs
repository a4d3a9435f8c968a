use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mlp::{Activation, LayerSpec, Loss, Matrix, Network, SimpleGradientDescent, Topology};

criterion_main!(benches);
criterion_group!(benches, predict_batch, train_batch, multiply);

const BATCH: usize = 64;
const INPUTS: usize = 128;

fn network(rng: &mut StdRng) -> Network {
    let topology = Topology {
        inputs: INPUTS,
        layers: vec![
            LayerSpec::new(64, Activation::Relu),
            LayerSpec::new(32, Activation::Tanh),
            LayerSpec::new(10, Activation::Softmax),
        ],
        loss: Loss::CrossEntropy,
    };
    Network::random(&topology, rng).unwrap()
}

fn random_matrix(rows: usize, columns: usize, rng: &mut StdRng) -> Matrix {
    let values = (0..rows * columns).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Matrix::from_vec(rows, columns, values).unwrap()
}

fn one_hot_labels(rows: usize, classes: usize) -> Matrix {
    let mut labels = Matrix::zeros(rows, classes).unwrap();
    for row in 0..rows {
        labels.set(row, row % classes, 1.0).unwrap();
    }
    labels
}

fn predict_batch(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let network = network(&mut rng);
    let inputs = random_matrix(BATCH, INPUTS, &mut rng);

    c.bench_function("predict_batch", |b| {
        b.iter(|| network.predict(black_box(&inputs)))
    });
}

fn train_batch(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let mut network = network(&mut rng);
    let inputs = random_matrix(BATCH, INPUTS, &mut rng);
    let labels = one_hot_labels(BATCH, 10);

    let mut t = 0;
    c.bench_function("train_batch", |b| {
        b.iter(|| {
            t += 1;
            network.train_batch(
                t,
                black_box(&inputs),
                black_box(&labels),
                0.001,
                0.0,
                &mut SimpleGradientDescent,
            )
        })
    });
}

fn multiply(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let a = random_matrix(BATCH, INPUTS, &mut rng);
    let b = random_matrix(INPUTS, 64, &mut rng);

    c.bench_function("multiply", |bencher| {
        bencher.iter(|| black_box(&a).multiply(black_box(&b)))
    });
}

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use zk_logreg::{
    circuits::{AccuracyChunkCircuit, CircuitConfig, LinearWitness, SigmoidClassifierCircuit},
    fixed_point::encode,
    lookup::sigmoid_table,
    model::{ModelParameters, Sample},
};

const MODEL: ModelParameters = ModelParameters {
    w: -0.85735312,
    b: 50.94705066,
};

fn samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            let feature = 20.0 + (i % 60) as f64;
            Sample {
                feature,
                label: (feature <= 59.0) as u8,
            }
        })
        .collect()
}

fn bench_float_accuracy(c: &mut Criterion) {
    let mut group = c.benchmark_group("Bench Accuracy: Normal Method");
    for n in [25, 100, 1000] {
        let samples = samples(n);
        group.bench_with_input(BenchmarkId::new("Number of samples", n), &samples, |b, s| {
            b.iter(|| MODEL.accuracy(black_box(s)))
        });
    }
    group.finish();
}

fn bench_fixed_point_inference(c: &mut Criterion) {
    let config = CircuitConfig::default();
    let p = config.precision;
    let table = sigmoid_table(&p, config.sigmoid_max_input);
    let classifier = SigmoidClassifierCircuit {
        precision: p,
        table: &table,
    };
    let chunk = AccuracyChunkCircuit {
        precision: p,
        size: config.chunk_size,
        margin_steps: config.margin_steps,
    };
    let encoded = MODEL.encode(&p);
    let samples = samples(config.chunk_size);
    let xs: Vec<i128> = samples
        .iter()
        .map(|s| encode(s.feature, p.value_bits))
        .collect();
    let labels: Vec<u8> = samples.iter().map(|s| s.label).collect();

    c.bench_function("Bench Sample: Normal Method", |b| {
        b.iter(|| {
            let z = LinearWitness::honest(encoded.w, encoded.b, black_box(xs[0]), &p)
                .unwrap()
                .z;
            classifier.predict(z)
        })
    });
    c.bench_function("Bench Chunk Count: Normal Method", |b| {
        b.iter(|| {
            chunk
                .count_correct(encoded.w, encoded.b, black_box(&xs), black_box(&labels))
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_float_accuracy, bench_fixed_point_inference);
criterion_main!(benches);

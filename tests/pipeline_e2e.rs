//! End-to-end runs of the proof pipeline on a reduced precision profile so
//! that every stage produces and verifies real proofs quickly.

use std::time::Duration;

use tempfile::TempDir;
use zk_logreg::{
    circuits::CircuitConfig,
    error::PipelineError,
    fixed_point::Precision,
    model::{ModelParameters, Sample},
    pipeline::{ChunkStatus, Pipeline, PipelineConfig, SampleOutcome},
};

const MODEL: ModelParameters = ModelParameters {
    w: -0.85735312,
    b: 50.94705066,
};

fn small_circuits() -> CircuitConfig {
    CircuitConfig {
        precision: Precision {
            value_bits: 16,
            lookup_bits: 4,
            output_bits: 8,
            range_bits: 40,
        },
        sigmoid_max_input: 8,
        margin_steps: 1,
        chunk_size: 2,
        num_chunks: 2,
        threshold: 3,
    }
}

fn config(cache_dir: Option<&TempDir>) -> PipelineConfig {
    PipelineConfig {
        circuit: small_circuits(),
        cache_dir: cache_dir.map(|d| d.path().to_path_buf()),
        threads: Some(2),
        deadline: None,
    }
}

fn sample(feature: f64, label: u8) -> Sample {
    Sample { feature, label }
}

#[test]
fn test_threshold_met() {
    let samples = [
        sample(40.0, 1),
        sample(75.0, 0),
        sample(30.0, 1),
        sample(59.0, 1),
        sample(90.0, 1),
    ];
    let report = Pipeline::new(config(None))
        .unwrap()
        .run(&MODEL, &samples)
        .unwrap();

    let outcomes: Vec<_> = report.samples.iter().map(|s| s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            SampleOutcome::Verified,
            SampleOutcome::Verified,
            SampleOutcome::Verified,
            SampleOutcome::Verified,
            SampleOutcome::Mismatch,
        ]
    );
    assert_eq!(report.tally.verified, 4);
    assert_eq!(report.tally.mismatched, 1);
    assert_eq!(report.samples[4].prediction, Some(0));

    assert_eq!(report.excluded_samples, 1);
    assert_eq!(report.evaluated_samples, 4);
    assert!(report
        .chunks
        .iter()
        .all(|c| c.status == ChunkStatus::Verified && c.attested == 2));
    assert_eq!(report.total_correct, 4);
    assert!(report.threshold_met);
    assert!(report.claim_verified);
    assert!(report.circuits.iter().all(|c| !c.from_cache));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["samples"][4]["outcome"], "mismatch");
    assert_eq!(json["chunks"][0]["status"], "verified");
}

#[test]
fn test_threshold_not_met() {
    // wrong labels cost one correct prediction per chunk
    let samples = [
        sample(40.0, 0),
        sample(75.0, 0),
        sample(30.0, 1),
        sample(59.0, 0),
    ];
    let report = Pipeline::new(config(None))
        .unwrap()
        .run(&MODEL, &samples)
        .unwrap();
    assert_eq!(report.tally.mismatched, 2);
    assert_eq!(
        report.chunks.iter().map(|c| c.count).collect::<Vec<_>>(),
        vec![1, 1]
    );
    assert_eq!(report.total_correct, 2);
    assert!(!report.threshold_met);
    assert!(!report.claim_verified);
}

#[test]
fn test_unencodable_features_are_recoverable() {
    let samples = [
        sample(40.0, 1),
        sample(f64::INFINITY, 0),
        sample(30.0, 1),
        sample(59.0, 1),
        sample(1e20, 1),
    ];
    let report = Pipeline::new(config(None))
        .unwrap()
        .run(&MODEL, &samples)
        .unwrap();

    for index in [1, 4] {
        let result = &report.samples[index];
        assert_eq!(result.outcome, SampleOutcome::WitnessFailed);
        assert_eq!(result.z, None);
        assert_eq!(result.prediction, None);
    }
    assert_eq!(report.tally.verified, 3);
    assert_eq!(report.tally.failed, 2);

    assert_eq!(report.chunks[0].status, ChunkStatus::WitnessFailed);
    assert_eq!(report.chunks[0].attested, 0);
    assert_eq!(report.chunks[1].status, ChunkStatus::Verified);
    assert_eq!(report.total_correct, 2);
    assert!(!report.threshold_met);
    assert!(!report.claim_verified);
}

#[test]
fn test_cache_reload_is_equivalent() {
    let dir = TempDir::new().unwrap();
    let samples = [
        sample(40.0, 1),
        sample(75.0, 0),
        sample(30.0, 1),
        sample(59.0, 1),
    ];

    let first = Pipeline::new(config(Some(&dir)))
        .unwrap()
        .run(&MODEL, &samples)
        .unwrap();
    assert!(first.circuits.iter().all(|c| !c.from_cache));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);

    let second = Pipeline::new(config(Some(&dir)))
        .unwrap()
        .run(&MODEL, &samples)
        .unwrap();
    assert!(second.circuits.iter().all(|c| c.from_cache));
    for (a, b) in first.circuits.iter().zip(&second.circuits) {
        assert_eq!(a.circuit, b.circuit);
        assert_eq!(a.num_constraints, b.num_constraints);
    }
    assert!(second.claim_verified);
    assert_eq!(second.tally.verified, 4);
}

#[test]
fn test_insufficient_samples() {
    let err = Pipeline::new(config(None))
        .unwrap()
        .run(&MODEL, &[sample(40.0, 1), sample(75.0, 0), sample(30.0, 1)])
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InsufficientSamples {
            needed: 4,
            chunks: 2,
            found: 3
        }
    ));
}

#[test]
fn test_expired_deadline() {
    let mut config = config(None);
    config.deadline = Some(Duration::ZERO);
    let samples = [
        sample(40.0, 1),
        sample(75.0, 0),
        sample(30.0, 1),
        sample(59.0, 1),
    ];
    let err = Pipeline::new(config)
        .unwrap()
        .run(&MODEL, &samples)
        .unwrap_err();
    assert!(matches!(err, PipelineError::DeadlineExceeded("aggregation")));
}

#[test]
fn test_bundled_dataset_chunk_counts() {
    use zk_logreg::{
        circuits::{AccuracyChunkCircuit, AggregatorCircuit, AggregatorWitness},
        fixed_point::encode,
        model::{load_dataset, load_model},
    };

    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = CircuitConfig::default();
    let p = config.precision;
    let samples = load_dataset(root.join("data/student_dataset_test.csv"), &p).unwrap();
    let model = load_model(root.join("data/best_model_parameters.txt")).unwrap();
    assert_eq!(samples.len(), 100);
    assert_eq!(model, MODEL);

    let encoded = model.encode(&p);
    let chunk = AccuracyChunkCircuit {
        precision: p,
        size: config.chunk_size,
        margin_steps: config.margin_steps,
    };
    let counts: Vec<u64> = samples
        .chunks(config.chunk_size)
        .map(|c| {
            let xs: Vec<i128> = c.iter().map(|s| encode(s.feature, p.value_bits)).collect();
            let labels: Vec<u8> = c.iter().map(|s| s.label).collect();
            chunk.count_correct(encoded.w, encoded.b, &xs, &labels).unwrap()
        })
        .collect();
    assert_eq!(counts, vec![25, 25, 25, 25]);

    let aggregator = AggregatorCircuit {
        chunks: config.num_chunks,
        threshold: config.threshold,
    };
    assert!(aggregator.meets_threshold(&AggregatorWitness { counts }));
    assert!(!aggregator.meets_threshold(&AggregatorWitness {
        counts: vec![24, 25, 25, 22]
    }));
}

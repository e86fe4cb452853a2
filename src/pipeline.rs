//! End-to-end accuracy proof: per-sample inference proofs, per-chunk
//! correct counts and a threshold aggregate.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::{setup_or_load, CircuitCache},
    circuit::Circuit,
    circuits::{
        AccuracyChunkCircuit, AggregatorCircuit, AggregatorWitness, CircuitConfig, LinearCircuit,
        LinearWitness, SigmoidClassifierCircuit, SigmoidWitness,
    },
    error::{CircuitError, PipelineError, ProveError},
    fixed_point::decode,
    lookup::{sigmoid_table, LookupTable},
    model::{ModelParameters, Sample},
    protocol::{prove_witness, verify, CompiledCircuit, Proof},
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub circuit: CircuitConfig,
    /// `None` disables the on-disk cache.
    pub cache_dir: Option<PathBuf>,
    /// Worker threads; `None` uses the available parallelism.
    pub threads: Option<usize>,
    pub deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            circuit: CircuitConfig::default(),
            cache_dir: Some(PathBuf::from("data")),
            threads: None,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOutcome {
    /// Both proofs produced and verified.
    Verified,
    /// The model's prediction disagrees with the label, so no classifier
    /// proof exists.
    Mismatch,
    WitnessFailed,
    ProofFailed,
    VerificationFailed,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleResult {
    pub index: usize,
    pub feature: f64,
    pub label: u8,
    /// `None` when no witness could be built for the sample.
    pub z: Option<f64>,
    pub prediction: Option<u8>,
    pub outcome: SampleOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SampleTally {
    pub total: usize,
    pub verified: usize,
    pub mismatched: usize,
    pub failed: usize,
    pub verification_failed: usize,
    pub skipped: usize,
}

impl SampleTally {
    fn from_results(results: &[SampleResult]) -> Self {
        let mut tally = SampleTally {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.outcome {
                SampleOutcome::Verified => tally.verified += 1,
                SampleOutcome::Mismatch => tally.mismatched += 1,
                SampleOutcome::WitnessFailed | SampleOutcome::ProofFailed => tally.failed += 1,
                SampleOutcome::VerificationFailed => tally.verification_failed += 1,
                SampleOutcome::DeadlineExceeded => tally.skipped += 1,
            }
        }
        tally
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Verified,
    WitnessFailed,
    ProofFailed,
    VerificationFailed,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResult {
    pub index: usize,
    pub first_sample: usize,
    /// Off-circuit count of correct, eligible predictions; zero when no
    /// witness could be built.
    pub count: u64,
    /// Count fed to the aggregator: `count` if the chunk proof verified,
    /// otherwise zero.
    pub attested: u64,
    pub status: ChunkStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub circuit: String,
    pub num_constraints: usize,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccuracyReport {
    pub samples: Vec<SampleResult>,
    pub tally: SampleTally,
    pub chunks: Vec<ChunkResult>,
    /// Samples past the last chunk.
    pub excluded_samples: usize,
    pub total_correct: u64,
    pub evaluated_samples: usize,
    pub threshold: u64,
    pub threshold_met: bool,
    /// The aggregate proof was produced and verified.
    pub claim_verified: bool,
    pub circuits: Vec<CircuitStats>,
    pub elapsed_ms: u64,
}

struct SampleAttempt {
    z: Option<i128>,
    proved: Result<ProvedSample, SampleOutcome>,
}

struct ProvedSample {
    linear: LinearWitness,
    linear_proof: Proof,
    sigmoid: SigmoidWitness,
    sigmoid_proof: Proof,
}

struct Deadline(Option<Instant>);

impl Deadline {
    fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

fn failure(err: &ProveError, infeasible: SampleOutcome) -> SampleOutcome {
    match err {
        ProveError::Infeasible(_) => infeasible,
        ProveError::Witness(_) => SampleOutcome::WitnessFailed,
        ProveError::Infrastructure(_) => SampleOutcome::ProofFailed,
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    cache: Option<CircuitCache>,
    table: LookupTable,
    pool: rayon::ThreadPool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let threads = config
            .threads
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        let table = sigmoid_table(&config.circuit.precision, config.circuit.sigmoid_max_input);
        Ok(Self {
            cache: config.cache_dir.clone().map(CircuitCache::new),
            config,
            table,
            pool,
        })
    }

    fn linear(&self) -> LinearCircuit {
        LinearCircuit {
            precision: self.config.circuit.precision,
        }
    }

    fn sigmoid(&self) -> SigmoidClassifierCircuit<'_> {
        SigmoidClassifierCircuit {
            precision: self.config.circuit.precision,
            table: &self.table,
        }
    }

    fn chunk(&self) -> AccuracyChunkCircuit {
        AccuracyChunkCircuit {
            precision: self.config.circuit.precision,
            size: self.config.circuit.chunk_size,
            margin_steps: self.config.circuit.margin_steps,
        }
    }

    fn aggregator(&self) -> AggregatorCircuit {
        AggregatorCircuit {
            chunks: self.config.circuit.num_chunks,
            threshold: self.config.circuit.threshold,
        }
    }

    fn load<C: Circuit>(
        &self,
        circuit: &C,
        stats: &mut Vec<CircuitStats>,
    ) -> Result<Arc<CompiledCircuit>, PipelineError> {
        let fingerprint = circuit.spec().fingerprint(&self.config.circuit);
        let (compiled, from_cache) = setup_or_load(self.cache.as_ref(), circuit, fingerprint)?;
        stats.push(CircuitStats {
            circuit: compiled.spec.id(),
            num_constraints: compiled.num_constraints(),
            from_cache,
        });
        Ok(compiled)
    }

    #[instrument(skip_all, fields(samples = samples.len()))]
    pub fn run(
        &self,
        model: &ModelParameters,
        samples: &[Sample],
    ) -> Result<AccuracyReport, PipelineError> {
        let started = Instant::now();
        let deadline = Deadline(self.config.deadline.map(|d| started + d));
        let config = &self.config.circuit;

        let needed = config.accuracy_samples();
        if samples.len() < needed {
            return Err(PipelineError::InsufficientSamples {
                needed,
                chunks: config.num_chunks,
                found: samples.len(),
            });
        }

        let mut stats = vec![];
        let linear = self.load(&self.linear(), &mut stats)?;
        let sigmoid = self.load(&self.sigmoid(), &mut stats)?;

        let attempts = self.prove_samples(model, samples, &linear, &sigmoid, &deadline);
        let results = self.verify_samples(samples, attempts, &linear, &sigmoid);
        let tally = SampleTally::from_results(&results);
        info!(
            verified = tally.verified,
            mismatched = tally.mismatched,
            failed = tally.failed,
            verification_failed = tally.verification_failed,
            skipped = tally.skipped,
            "inference proofs done"
        );

        let chunk = self.load(&self.chunk(), &mut stats)?;
        let excluded_samples = samples.len() - needed;
        if excluded_samples > 0 {
            info!(excluded_samples, "samples past the last chunk are not counted");
        }
        let chunks = self.prove_chunks(model, &samples[..needed], &chunk, &deadline);

        let aggregator = self.load(&self.aggregator(), &mut stats)?;
        if deadline.expired() {
            return Err(PipelineError::DeadlineExceeded("aggregation"));
        }
        let witness = AggregatorWitness {
            counts: chunks.iter().map(|c| c.attested).collect(),
        };
        let claim_verified = self.aggregate(&aggregator, &witness)?;
        let total_correct = witness.total();
        let threshold_met = self.aggregator().meets_threshold(&witness);
        info!(
            total_correct,
            evaluated = needed,
            threshold = config.threshold,
            threshold_met,
            claim_verified,
            "accuracy claim"
        );

        Ok(AccuracyReport {
            samples: results,
            tally,
            chunks,
            excluded_samples,
            total_correct,
            evaluated_samples: needed,
            threshold: config.threshold,
            threshold_met,
            claim_verified,
            circuits: stats,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn prove_samples(
        &self,
        model: &ModelParameters,
        samples: &[Sample],
        linear: &CompiledCircuit,
        sigmoid: &CompiledCircuit,
        deadline: &Deadline,
    ) -> Vec<SampleAttempt> {
        let precision = self.config.circuit.precision;
        let encoded = model.encode(&precision);
        let (linear_circuit, sigmoid_circuit) = (self.linear(), self.sigmoid());

        self.pool.install(|| {
            samples
                .par_iter()
                .enumerate()
                .map(|(index, sample)| {
                    let linear_witness = sample
                        .encoded_feature(&precision)
                        .ok_or(CircuitError::OutOfRange {
                            label: "feature",
                            bits: precision.range_bits,
                        })
                        .and_then(|x| LinearWitness::honest(encoded.w, encoded.b, x, &precision));
                    let linear_witness = match linear_witness {
                        Ok(witness) => witness,
                        Err(err) => {
                            warn!(index, error = %err, "no witness for sample");
                            return SampleAttempt {
                                z: None,
                                proved: Err(SampleOutcome::WitnessFailed),
                            };
                        }
                    };
                    let z = linear_witness.z;
                    if deadline.expired() {
                        return SampleAttempt {
                            z: Some(z),
                            proved: Err(SampleOutcome::DeadlineExceeded),
                        };
                    }

                    let proved = prove_witness(linear, &linear_circuit, &linear_witness)
                        .map_err(|err| {
                            debug!(index, error = %err, "linear proof failed");
                            failure(&err, SampleOutcome::WitnessFailed)
                        })
                        .and_then(|linear_proof| {
                            let sigmoid_witness = SigmoidWitness {
                                z,
                                label: sample.label,
                            };
                            prove_witness(sigmoid, &sigmoid_circuit, &sigmoid_witness)
                                .map(|sigmoid_proof| ProvedSample {
                                    linear: linear_witness,
                                    linear_proof,
                                    sigmoid: sigmoid_witness,
                                    sigmoid_proof,
                                })
                                .map_err(|err| {
                                    debug!(index, error = %err, "classifier proof failed");
                                    failure(&err, SampleOutcome::Mismatch)
                                })
                        });
                    SampleAttempt {
                        z: Some(z),
                        proved,
                    }
                })
                .collect()
        })
    }

    fn verify_samples(
        &self,
        samples: &[Sample],
        attempts: Vec<SampleAttempt>,
        linear: &CompiledCircuit,
        sigmoid: &CompiledCircuit,
    ) -> Vec<SampleResult> {
        let value_bits = self.config.circuit.precision.value_bits;
        let sigmoid_circuit = self.sigmoid();

        self.pool.install(|| {
            attempts
                .into_par_iter()
                .zip(samples.par_iter())
                .enumerate()
                .map(|(index, (attempt, sample))| {
                    let outcome = match attempt.proved {
                        Err(outcome) => outcome,
                        Ok(p) => {
                            let checks = [
                                verify(&p.linear_proof, &linear.vk, &p.linear.public_inputs()),
                                verify(&p.sigmoid_proof, &sigmoid.vk, &p.sigmoid.public_inputs()),
                            ];
                            match checks.iter().find_map(|c| c.as_ref().err()) {
                                None => SampleOutcome::Verified,
                                Some(err) => {
                                    warn!(index, error = %err, "proof did not verify");
                                    SampleOutcome::VerificationFailed
                                }
                            }
                        }
                    };
                    SampleResult {
                        index,
                        feature: sample.feature,
                        label: sample.label,
                        z: attempt.z.map(|z| decode(z, value_bits)),
                        prediction: attempt.z.map(|z| sigmoid_circuit.predict(z)),
                        outcome,
                    }
                })
                .collect()
        })
    }

    fn prove_chunks(
        &self,
        model: &ModelParameters,
        samples: &[Sample],
        compiled: &CompiledCircuit,
        deadline: &Deadline,
    ) -> Vec<ChunkResult> {
        let precision = self.config.circuit.precision;
        let encoded = model.encode(&precision);
        let circuit = self.chunk();

        self.pool.install(|| {
            samples
                .par_chunks(circuit.size)
                .enumerate()
                .map(|(index, chunk)| {
                    let xs = chunk
                        .iter()
                        .map(|s| s.encoded_feature(&precision))
                        .collect::<Option<Vec<_>>>()
                        .ok_or(CircuitError::OutOfRange {
                            label: "feature",
                            bits: precision.range_bits,
                        });
                    let labels = chunk.iter().map(|s| s.label).collect();
                    let witness = xs.and_then(|xs| circuit.witness(encoded.w, encoded.b, xs, labels));
                    let witness = match witness {
                        Ok(witness) => witness,
                        Err(err) => {
                            warn!(index, error = %err, "no witness for chunk");
                            return ChunkResult {
                                index,
                                first_sample: index * circuit.size,
                                count: 0,
                                attested: 0,
                                status: ChunkStatus::WitnessFailed,
                            };
                        }
                    };
                    let status = if deadline.expired() {
                        ChunkStatus::DeadlineExceeded
                    } else {
                        match prove_witness(compiled, &circuit, &witness) {
                            Err(err) => {
                                warn!(index, error = %err, "chunk proof failed");
                                ChunkStatus::ProofFailed
                            }
                            Ok(proof) => match verify(&proof, &compiled.vk, &witness.public_inputs()) {
                                Ok(()) => ChunkStatus::Verified,
                                Err(err) => {
                                    warn!(index, error = %err, "chunk proof did not verify");
                                    ChunkStatus::VerificationFailed
                                }
                            },
                        }
                    };
                    let attested = if status == ChunkStatus::Verified {
                        witness.count
                    } else {
                        0
                    };
                    debug!(index, count = witness.count, ?status, "chunk done");
                    ChunkResult {
                        index,
                        first_sample: index * circuit.size,
                        count: witness.count,
                        attested,
                        status,
                    }
                })
                .collect()
        })
    }

    /// Proves and verifies the aggregate. `Ok(false)` when the counts fall
    /// short of the threshold and no proof can exist.
    fn aggregate(
        &self,
        compiled: &CompiledCircuit,
        witness: &AggregatorWitness,
    ) -> Result<bool, PipelineError> {
        let proof = match prove_witness(compiled, &self.aggregator(), witness) {
            Ok(proof) => proof,
            Err(err) if err.is_infeasible() => {
                info!(total = witness.total(), "threshold not met, no aggregate proof");
                return Ok(false);
            }
            Err(err) => return Err(PipelineError::Aggregate(err)),
        };
        verify(&proof, &compiled.vk, &witness.public_inputs())
            .map_err(PipelineError::AggregateVerify)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, outcome: SampleOutcome) -> SampleResult {
        SampleResult {
            index,
            feature: 0.0,
            label: 1,
            z: Some(0.0),
            prediction: Some(1),
            outcome,
        }
    }

    #[test]
    fn test_tally() {
        let results = [
            SampleOutcome::Verified,
            SampleOutcome::Verified,
            SampleOutcome::Mismatch,
            SampleOutcome::WitnessFailed,
            SampleOutcome::ProofFailed,
            SampleOutcome::VerificationFailed,
            SampleOutcome::DeadlineExceeded,
        ]
        .into_iter()
        .enumerate()
        .map(|(i, o)| result(i, o))
        .collect::<Vec<_>>();
        assert_eq!(
            SampleTally::from_results(&results),
            SampleTally {
                total: 7,
                verified: 2,
                mismatched: 1,
                failed: 2,
                verification_failed: 1,
                skipped: 1,
            }
        );
    }

    #[test]
    fn test_deadline() {
        assert!(!Deadline(None).expired());
        assert!(Deadline(Some(Instant::now())).expired());
        assert!(!Deadline(Some(Instant::now() + Duration::from_secs(3600))).expired());
    }

    #[test]
    fn test_insufficient_samples_checked_before_setup() {
        let pipeline = Pipeline::new(PipelineConfig {
            cache_dir: None,
            threads: Some(1),
            ..Default::default()
        })
        .unwrap();
        let model = ModelParameters { w: 1.0, b: 0.0 };
        let samples = vec![
            Sample {
                feature: 1.0,
                label: 1
            };
            99
        ];
        let err = pipeline.run(&model, &samples).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientSamples {
                needed: 100,
                chunks: 4,
                found: 99
            }
        ));
    }
}

//! Narrated client/server walk-through of the protocol with simulated
//! network latency. No proofs are generated; every outcome it reports comes
//! from the same off-circuit rules the circuits enforce.

use std::{thread, time::Duration};

use tracing::info;

use crate::{
    circuits::{AccuracyChunkCircuit, CircuitConfig, LinearWitness, SigmoidClassifierCircuit},
    lookup::sigmoid_table,
    model::{ModelParameters, Sample},
};

/// Samples narrated individually before the chunk phase.
const SAMPLE_PREVIEW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationSummary {
    pub round_trips: usize,
    pub simulated: Duration,
    pub total_correct: u64,
    pub evaluated_samples: usize,
    pub threshold_met: bool,
}

pub struct Simulation<'a> {
    pub config: CircuitConfig,
    pub model: ModelParameters,
    pub samples: &'a [Sample],
    pub latency: Duration,
}

impl Simulation<'_> {
    fn send(&self, summary: &mut SimulationSummary, message: &str, latency: Duration) {
        info!("{message}");
        summary.simulated += latency;
        thread::sleep(latency);
    }

    fn round_trip(&self, summary: &mut SimulationSummary, message: &str) {
        summary.round_trips += 1;
        self.send(summary, message, self.latency);
    }

    pub fn run(&self) -> SimulationSummary {
        let config = &self.config;
        let precision = config.precision;
        let encoded = self.model.encode(&precision);
        let table = sigmoid_table(&precision, config.sigmoid_max_input);
        let classifier = SigmoidClassifierCircuit {
            precision,
            table: &table,
        };
        let chunk_circuit = AccuracyChunkCircuit {
            precision,
            size: config.chunk_size,
            margin_steps: config.margin_steps,
        };
        let mut summary = SimulationSummary {
            round_trips: 0,
            simulated: Duration::ZERO,
            total_correct: 0,
            evaluated_samples: 0,
            threshold_met: false,
        };

        info!(
            samples = self.samples.len(),
            latency_ms = self.latency.as_millis() as u64,
            "zk logistic regression network simulation"
        );

        info!("phase 1: setup");
        self.round_trip(&mut summary, "client -> server: connect");
        self.send(
            &mut summary,
            "server: compiling or loading linear, classifier, chunk and aggregator circuits",
            self.latency / 2,
        );
        self.round_trip(&mut summary, "server -> client: verifying keys");

        info!(preview = SAMPLE_PREVIEW, "phase 2: per-sample proofs");
        for (i, sample) in self.samples.iter().take(SAMPLE_PREVIEW).enumerate() {
            info!(sample = i + 1, feature = sample.feature, label = sample.label, "sample");
            self.send(&mut summary, "  client -> server: sample", self.latency / 10);
            self.send(&mut summary, "  server: proving linear + classifier", self.latency / 5);
            let z = sample
                .encoded_feature(&precision)
                .and_then(|x| LinearWitness::honest(encoded.w, encoded.b, x, &precision).ok())
                .map(|witness| witness.z);
            match z {
                Some(z) if classifier.predict(z) == sample.label => {
                    self.send(&mut summary, "  server -> client: proofs", self.latency / 10);
                    self.send(&mut summary, "  client: both proofs verified", self.latency / 20);
                }
                Some(_) => info!("  server: no proof, model prediction disagrees with label"),
                None => info!("  server: no witness, feature is outside the fixed-point range"),
            }
        }

        let needed = config.accuracy_samples();
        let evaluated = &self.samples[..needed.min(self.samples.len())];
        info!(
            chunks = config.num_chunks,
            chunk_size = config.chunk_size,
            "phase 3: chunked accuracy proofs"
        );
        for (index, chunk) in evaluated.chunks(config.chunk_size).enumerate() {
            let xs: Option<Vec<i128>> = chunk.iter().map(|s| s.encoded_feature(&precision)).collect();
            let labels: Vec<u8> = chunk.iter().map(|s| s.label).collect();
            let count = xs
                .and_then(|xs| chunk_circuit.count_correct(encoded.w, encoded.b, &xs, &labels).ok())
                .unwrap_or(0);
            summary.total_correct += count;

            info!(chunk = index + 1, first = index * config.chunk_size + 1, "chunk");
            self.round_trip(&mut summary, "  client -> server: chunk samples");
            self.send(&mut summary, "  server: computing predictions", self.latency * 2);
            self.send(&mut summary, "  server: proving chunk count", self.latency * 3);
            self.round_trip(&mut summary, "  server -> client: chunk proof");
            self.send(&mut summary, "  client: verifying chunk proof", self.latency / 2);
            info!(chunk = index + 1, count, size = chunk.len(), "  chunk verified");
        }
        summary.evaluated_samples = evaluated.len();

        info!("phase 4: aggregate");
        self.send(&mut summary, "server: aggregating chunk counts", self.latency);
        self.send(&mut summary, "server: proving total >= threshold", self.latency * 2);
        summary.threshold_met =
            evaluated.len() == needed && summary.total_correct >= config.threshold;
        if summary.threshold_met {
            self.round_trip(&mut summary, "server -> client: aggregate proof");
            self.send(&mut summary, "client: aggregate proof verified", self.latency / 2);
        } else {
            info!("server: total below threshold, no aggregate proof");
        }
        info!(
            total_correct = summary.total_correct,
            evaluated = summary.evaluated_samples,
            threshold = config.threshold,
            threshold_met = summary.threshold_met,
            round_trips = summary.round_trips,
            simulated_ms = summary.simulated.as_millis() as u64,
            "simulation complete"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Sample> {
        (0..100)
            .map(|i| {
                let feature = 20.0 + (i % 60) as f64;
                Sample {
                    feature,
                    label: (feature <= 59.0) as u8,
                }
            })
            .collect()
    }

    #[test]
    fn test_simulation_counts_match_the_model() {
        let samples = samples();
        let sim = Simulation {
            config: CircuitConfig::default(),
            model: ModelParameters {
                w: -0.85735312,
                b: 50.94705066,
            },
            samples: &samples,
            latency: Duration::ZERO,
        };
        let summary = sim.run();
        assert_eq!(summary.evaluated_samples, 100);
        assert_eq!(summary.total_correct, 100);
        assert!(summary.threshold_met);
        // setup (2), chunks (2 each), aggregate proof (1)
        assert_eq!(summary.round_trips, 2 + 2 * 4 + 1);
    }

    #[test]
    fn test_short_dataset_does_not_meet_threshold() {
        let samples = samples();
        let sim = Simulation {
            config: CircuitConfig::default(),
            model: ModelParameters {
                w: -0.85735312,
                b: 50.94705066,
            },
            samples: &samples[..60],
            latency: Duration::ZERO,
        };
        let summary = sim.run();
        assert_eq!(summary.evaluated_samples, 60);
        assert!(!summary.threshold_met);
    }

    #[test]
    fn test_unencodable_feature_does_not_abort() {
        let mut samples = samples();
        samples[3].feature = f64::INFINITY;
        samples[40].feature = 1e20;
        let sim = Simulation {
            config: CircuitConfig::default(),
            model: ModelParameters {
                w: -0.85735312,
                b: 50.94705066,
            },
            samples: &samples,
            latency: Duration::ZERO,
        };
        let summary = sim.run();
        // both affected chunks attest nothing
        assert_eq!(summary.total_correct, 50);
        assert!(!summary.threshold_met);
    }
}

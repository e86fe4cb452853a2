//! The four circuits of the accuracy proof and the configuration they share.

pub mod aggregator;
pub mod chunk;
pub mod linear;
pub mod sigmoid;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::fixed_point::Precision;

pub use aggregator::{AggregatorCircuit, AggregatorWitness};
pub use chunk::{AccuracyChunkCircuit, ChunkWitness};
pub use linear::{LinearCircuit, LinearWitness};
pub use sigmoid::{SigmoidClassifierCircuit, SigmoidWitness};

/// Bumped whenever the constraint layout of any circuit changes.
pub const CIRCUIT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitSpec {
    Linear,
    SigmoidClassifier,
    AccuracyChunk { size: usize },
    Aggregator { chunks: usize, threshold: u64 },
}

impl CircuitSpec {
    /// Stable identifier, used as the cache file stem.
    pub fn id(&self) -> String {
        match self {
            CircuitSpec::Linear => "linear".to_string(),
            CircuitSpec::SigmoidClassifier => "sigmoid_classifier".to_string(),
            CircuitSpec::AccuracyChunk { size } => format!("accuracy_chunk_{size}"),
            CircuitSpec::Aggregator { chunks, threshold } => {
                format!("aggregator_{chunks}_{threshold}")
            }
        }
    }

    /// Digest of everything that determines this spec's constraint system.
    pub fn fingerprint(&self, config: &CircuitConfig) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"zk-logreg circuit");
        hasher.update(CIRCUIT_FORMAT_VERSION.to_le_bytes());
        hasher.update(self.id().as_bytes());
        let p = &config.precision;
        for v in [p.value_bits, p.lookup_bits, p.output_bits, p.range_bits] {
            hasher.update(v.to_le_bytes());
        }
        hasher.update(config.sigmoid_max_input.to_le_bytes());
        hasher.update(config.margin_steps.to_le_bytes());
        hasher.finalize().into()
    }
}

impl fmt::Display for CircuitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub precision: Precision,
    /// The sigmoid table covers `[0, sigmoid_max_input]`.
    pub sigmoid_max_input: u32,
    /// Eligibility margin in lookup-domain steps.
    pub margin_steps: u64,
    pub chunk_size: usize,
    pub num_chunks: usize,
    /// Minimum total correct count the aggregator accepts.
    pub threshold: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            sigmoid_max_input: 8,
            margin_steps: 8,
            chunk_size: 25,
            num_chunks: 4,
            threshold: 97,
        }
    }
}

impl CircuitConfig {
    pub fn chunk_spec(&self) -> CircuitSpec {
        CircuitSpec::AccuracyChunk {
            size: self.chunk_size,
        }
    }

    pub fn aggregator_spec(&self) -> CircuitSpec {
        CircuitSpec::Aggregator {
            chunks: self.num_chunks,
            threshold: self.threshold,
        }
    }

    /// Samples consumed by the accuracy stage.
    pub fn accuracy_samples(&self) -> usize {
        self.chunk_size * self.num_chunks
    }
}

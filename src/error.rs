use std::path::PathBuf;

use crate::circuits::CircuitSpec;

#[derive(Debug, thiserror::Error)]
pub enum CircuitError {
    #[error("missing assignment for {0}")]
    MissingAssignment(&'static str),
    #[error("{label}: value does not fit in {bits} bits")]
    OutOfRange { label: &'static str, bits: u32 },
    #[error("constraint {index} ({label}) is not satisfied")]
    Unsatisfied { index: usize, label: &'static str },
    #[error("{label}: expected {expected} values, got {found}")]
    WitnessLength {
        label: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{0}: fixed-point overflow")]
    Overflow(&'static str),
    #[error(
        "witness shape mismatch: expected {expected_vars} vars / {expected_inputs} inputs, \
         got {found_vars} / {found_inputs}"
    )]
    ShapeMismatch {
        expected_vars: usize,
        expected_inputs: usize,
        found_vars: usize,
        found_inputs: usize,
    },
}

impl CircuitError {
    /// True when no satisfying assignment exists for the supplied values, as
    /// opposed to a defect in how the witness was put together.
    pub fn is_infeasible(&self) -> bool {
        matches!(
            self,
            CircuitError::OutOfRange { .. } | CircuitError::Unsatisfied { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid R1CS instance: {0}")]
    Instance(String),
    #[error("invalid assignment: {0}")]
    Assignment(String),
    #[error("key parameters do not match the constraint system")]
    KeyMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum ProveError {
    /// The witness cannot satisfy the circuit (e.g. the model disagrees with
    /// the label). Expected during normal operation.
    #[error("infeasible witness: {0}")]
    Infeasible(#[source] CircuitError),
    #[error("witness construction failed: {0}")]
    Witness(#[source] CircuitError),
    #[error("proving backend failed: {0}")]
    Infrastructure(#[from] BackendError),
}

impl From<CircuitError> for ProveError {
    fn from(err: CircuitError) -> Self {
        if err.is_infeasible() {
            ProveError::Infeasible(err)
        } else {
            ProveError::Witness(err)
        }
    }
}

impl ProveError {
    pub fn is_infeasible(&self) -> bool {
        matches!(self, ProveError::Infeasible(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("expected {expected} public inputs, got {found}")]
    PublicInputLength { expected: usize, found: usize },
    #[error("invalid public inputs: {0}")]
    PublicInput(String),
    #[error("proof rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache encoding: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("not a circuit cache file")]
    BadMagic,
    #[error("cache format version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
    #[error("cache was written for a different circuit spec")]
    Fingerprint,
    #[error("cache body checksum mismatch")]
    Checksum,
    #[error("cache file is truncated")]
    Truncated,
    #[error("cached keys are invalid: {0}")]
    Keys(#[from] BackendError),
}

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("compiling {spec}: {source}")]
    Compile {
        spec: CircuitSpec,
        #[source]
        source: CircuitError,
    },
    #[error("setting up {spec}: {source}")]
    Setup {
        spec: CircuitSpec,
        #[source]
        source: BackendError,
    },
    #[error("need {needed} samples for {chunks} chunks, dataset has {found}")]
    InsufficientSamples {
        needed: usize,
        chunks: usize,
        found: usize,
    },
    #[error("aggregator proof failed: {0}")]
    Aggregate(#[source] ProveError),
    #[error("aggregator proof did not verify: {0}")]
    AggregateVerify(#[source] VerifyError),
    #[error("deadline exceeded before {0}")]
    DeadlineExceeded(&'static str),
    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

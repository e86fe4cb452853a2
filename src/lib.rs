pub mod cache;
pub mod circuit;
pub mod circuits;
pub mod compiler;
pub mod error;
pub mod fixed_point;
pub mod lookup;
pub mod model;
pub mod pipeline;
pub mod protocol;
pub mod r1cs;
pub mod scalar;
pub mod simulation;

// Setup, Prover, Verifier
//
// Circuit(witness) -> public inputs
// R1CS: Circuit(witness) = public inputs
//
// 1. Setup
// Circuit -> R1CS (compiler)
// R1CS -> KeyParams -> Gens, Commitment (protocol)
// R1CS, ProvingKey, VerifyingKey -> cache file (cache)
//
// 2. Prover
// Model, Sample -> LinearWitness, SigmoidWitness -> Proof
// Model, Chunk -> ChunkWitness (count) -> Proof
// Chunk counts -> AggregatorWitness -> Proof
//
// 3. Verifier
// VerifyingKey, public inputs, Proof -> Verify

/// Parties: Setup, Prover, Verifier
///
/// Circuit(witness) -> public inputs
/// R1CS: Circuit(witness) =?= public inputs
///
/// 1. Setup
///     Circuit -> R1CS
///     R1CS -> KeyParams -> Gens
///     R1CS, Gens -> Commitment, Decommitment
///
/// 2. Prover (ProvingKey)
///     Gens, Commitment, Decommitment
///     Circuit, Witness -> Assignment
///     R1CS, Assignment -> Proof
///
/// 3. Verifier (VerifyingKey)
///     Gens, Commitment
///     Public inputs, Proof -> Verify
use std::sync::Arc;

use curve25519_dalek::Scalar;
use libspartan::{ComputationCommitment, ComputationDecommitment, Instance, SNARKGens, SNARK};
use merlin::Transcript;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    circuit::{Assignment, Circuit},
    circuits::CircuitSpec,
    compiler::assign_checked,
    error::{BackendError, ProveError, VerifyError},
    r1cs::{spartan_assignment, spartan_inputs, R1CS},
};

const TRANSCRIPT_LABEL: &[u8] = b"zk-logreg";

/// Dimensions and digest of the constraint system a key was set up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParams {
    pub num_cons: usize,
    pub num_vars: usize,
    pub num_inputs: usize,
    pub num_non_zero_entries: usize,
    pub r1cs_digest: [u8; 32],
}

impl KeyParams {
    pub fn for_r1cs(r1cs: &R1CS) -> Self {
        Self {
            num_cons: r1cs.num_cons,
            num_vars: r1cs.num_vars,
            num_inputs: r1cs.num_inputs,
            num_non_zero_entries: r1cs.num_non_zero_entries(),
            r1cs_digest: r1cs.digest(),
        }
    }

    fn gens(&self) -> SNARKGens {
        SNARKGens::new(
            self.num_cons,
            self.num_vars,
            self.num_inputs,
            self.num_non_zero_entries,
        )
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProvingKey {
    pub params: KeyParams,
    gens: Arc<SNARKGens>,
    commitment: Arc<ComputationCommitment>,
    decommitment: Arc<ComputationDecommitment>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VerifyingKey {
    pub params: KeyParams,
    spec: CircuitSpec,
    gens: Arc<SNARKGens>,
    commitment: Arc<ComputationCommitment>,
}

impl VerifyingKey {
    pub fn spec(&self) -> CircuitSpec {
        self.spec
    }

    pub fn num_inputs(&self) -> usize {
        self.params.num_inputs
    }
}

/// A circuit lowered to R1CS together with its keys. Read-only once built,
/// so one instance is shared by every concurrent proof of the same spec.
pub struct CompiledCircuit {
    pub spec: CircuitSpec,
    pub r1cs: R1CS,
    instance: Instance,
    pub pk: ProvingKey,
    pub vk: VerifyingKey,
}

impl CompiledCircuit {
    /// Reassembles a circuit from stored keys without running setup. Both
    /// keys must have been set up for `r1cs` under `spec`.
    pub fn from_keys(
        spec: CircuitSpec,
        r1cs: R1CS,
        pk: ProvingKey,
        vk: VerifyingKey,
    ) -> Result<Self, BackendError> {
        let params = KeyParams::for_r1cs(&r1cs);
        if pk.params != params || vk.params != params || vk.spec != spec {
            return Err(BackendError::KeyMismatch);
        }
        let instance = r1cs.instance()?;
        Ok(Self {
            spec,
            r1cs,
            instance,
            pk,
            vk,
        })
    }

    pub fn num_constraints(&self) -> usize {
        self.r1cs.num_cons
    }
}

pub struct Proof(SNARK);

impl Proof {
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.0)
    }
}

fn transcript(spec: CircuitSpec) -> Transcript {
    let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
    transcript.append_message(b"circuit", spec.id().as_bytes());
    transcript
}

/// Generates public parameters and commits to the constraint system.
pub fn setup(spec: CircuitSpec, r1cs: R1CS) -> Result<CompiledCircuit, BackendError> {
    let params = KeyParams::for_r1cs(&r1cs);
    let instance = r1cs.instance()?;
    let gens = Arc::new(params.gens());
    let (commitment, decommitment) = SNARK::encode(&instance, &gens);
    let commitment = Arc::new(commitment);
    debug!(%spec, num_cons = params.num_cons, "encoded constraint system");

    Ok(CompiledCircuit {
        spec,
        r1cs,
        instance,
        pk: ProvingKey {
            params,
            gens: Arc::clone(&gens),
            commitment: Arc::clone(&commitment),
            decommitment: Arc::new(decommitment),
        },
        vk: VerifyingKey {
            params,
            spec,
            gens,
            commitment,
        },
    })
}

/// Proves an assignment already checked against `compiled.r1cs`.
pub fn prove(compiled: &CompiledCircuit, assignment: &Assignment) -> Result<Proof, ProveError> {
    let (vars, inputs) = spartan_assignment(assignment)?;
    let pk = &compiled.pk;
    let proof = SNARK::prove(
        &compiled.instance,
        &pk.commitment,
        &pk.decommitment,
        vars,
        &inputs,
        &pk.gens,
        &mut transcript(compiled.spec),
    );
    Ok(Proof(proof))
}

/// Assigns `witness` and proves it. An unsatisfiable witness is reported as
/// [`ProveError::Infeasible`] and never reaches the backend.
pub fn prove_witness<C: Circuit>(
    compiled: &CompiledCircuit,
    circuit: &C,
    witness: &C::Witness,
) -> Result<Proof, ProveError> {
    let assignment = assign_checked(circuit, &compiled.r1cs, witness)?;
    prove(compiled, &assignment)
}

pub fn verify(proof: &Proof, vk: &VerifyingKey, public_inputs: &[Scalar]) -> Result<(), VerifyError> {
    if public_inputs.len() != vk.num_inputs() {
        return Err(VerifyError::PublicInputLength {
            expected: vk.num_inputs(),
            found: public_inputs.len(),
        });
    }
    let inputs =
        spartan_inputs(public_inputs).map_err(|err| VerifyError::PublicInput(err.to_string()))?;
    proof
        .0
        .verify(&vk.commitment, &inputs, &mut transcript(vk.spec), &vk.gens)
        .map_err(|err| VerifyError::Rejected(format!("{err:?}")))
}

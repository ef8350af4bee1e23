//! Proving backends and the factory binding them to a circuit.

use std::sync::Arc;

use ark_bn254::Fr;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use common::constants::DEFAULT_PROVER_THREADS;
use common::field_conversion::fr_to_decimal;
use serde::{Deserialize, Serialize};

use crate::r1cs::CompiledCircuit;
use crate::recursion::RecursiveArtifacts;
use crate::utils::errors::ChainError;
use crate::utils::serializable::Serializable;

pub mod engine;
pub mod transparent;

pub use engine::{ExecutionEngine, Witness};
pub use transparent::TransparentBackend;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOptions {
    /// Size of the backend's worker pool; 0 uses rayon's default.
    pub threads: usize,
    /// Proofs from a recursive backend can be verified inside another circuit.
    pub recursive: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            threads: DEFAULT_PROVER_THREADS,
            recursive: true,
        }
    }
}

impl BackendOptions {
    pub fn recursive(threads: usize) -> Self {
        Self {
            threads,
            recursive: true,
        }
    }
}

/// Opaque proof bytes as produced by a backend.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Proof {
    pub bytes: Vec<u8>,
}

/// Public inputs exposed by a proof, in the circuit's declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct PublicInputs {
    pub values: Vec<Fr>,
}

impl PublicInputs {
    pub fn new(values: Vec<Fr>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Fr] {
        &self.values
    }

    pub fn to_decimal_strings(&self) -> Vec<String> {
        self.values.iter().map(fr_to_decimal).collect()
    }
}

impl Serializable for Proof {}
impl Serializable for PublicInputs {}

/// A proving system bound to one circuit and one configuration.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn circuit(&self) -> &CompiledCircuit;

    fn options(&self) -> BackendOptions;

    /// Produces a proof for a satisfying witness, together with the public inputs it exposes.
    fn prove(&self, witness: &Witness) -> Result<(Proof, PublicInputs), ChainError>;

    /// Derives the field-encoded verification material a recursive circuit consumes.
    ///
    /// `num_public_inputs` must equal `public_inputs.len()`.
    fn recursive_artifacts(
        &self,
        proof: &Proof,
        public_inputs: &PublicInputs,
        num_public_inputs: usize,
    ) -> Result<RecursiveArtifacts, ChainError>;

    /// `Ok(false)` rejects the proof; `Err` means the request could not be evaluated.
    fn verify(&self, proof: &Proof, public_inputs: &PublicInputs) -> Result<bool, ChainError>;
}

/// Builds the backend and execution engine for one stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct BackendFactory {
    options: BackendOptions,
}

impl BackendFactory {
    pub fn new(options: BackendOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> BackendOptions {
        self.options
    }

    #[tracing::instrument(skip_all, name = "BackendFactory::bind")]
    pub fn bind(&self, circuit: Arc<CompiledCircuit>) -> Result<StageBackend, ChainError> {
        tracing::debug!(
            circuit = circuit.name(),
            threads = self.options.threads,
            recursive = self.options.recursive,
            "binding backend"
        );
        circuit.validate()?;
        let backend = TransparentBackend::new(circuit.clone(), self.options)?;
        let engine = ExecutionEngine::new(circuit);
        Ok(StageBackend { backend, engine })
    }
}

/// A backend and its execution engine, owned together for the lifetime of one stage.
pub struct StageBackend {
    backend: TransparentBackend,
    engine: ExecutionEngine,
}

impl StageBackend {
    pub fn backend(&self) -> &TransparentBackend {
        &self.backend
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn circuit(&self) -> &CompiledCircuit {
        self.backend.circuit()
    }

    pub fn options(&self) -> BackendOptions {
        self.backend.options()
    }
}

use std::sync::Arc;

use crate::backend::{Backend, BackendOptions, Proof, PublicInputs, TransparentBackend};
use crate::r1cs::CompiledCircuit;
use crate::utils::errors::ChainError;

/// Verifies proofs against a freshly built backend.
///
/// By default the backend is recursion-capable, matching every stage whose
/// proof was handed onward.
#[derive(Clone, Copy, Debug)]
pub struct ProofVerifier {
    options: BackendOptions,
}

impl ProofVerifier {
    pub fn new(threads: usize) -> Self {
        Self {
            options: BackendOptions::recursive(threads),
        }
    }

    pub fn with_options(options: BackendOptions) -> Self {
        Self { options }
    }

    #[tracing::instrument(skip_all, name = "ProofVerifier::verify", fields(circuit = %circuit.name()))]
    pub fn verify(
        &self,
        circuit: Arc<CompiledCircuit>,
        proof: &Proof,
        public_inputs: &PublicInputs,
    ) -> Result<bool, ChainError> {
        let backend = TransparentBackend::new(circuit, self.options)
            .map_err(|e| ChainError::Verification(e.to_string()))?;
        let verified = backend.verify(proof, public_inputs)?;
        tracing::info!(verified, "verification finished");
        Ok(verified)
    }
}

impl Default for ProofVerifier {
    fn default() -> Self {
        Self::new(common::constants::DEFAULT_PROVER_THREADS)
    }
}

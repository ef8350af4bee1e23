use crate::backend::{Backend, Proof, PublicInputs, Witness};
use crate::recursion::RecursiveArtifacts;
use crate::utils::errors::ChainError;

/// Everything one stage hands onward: its proof, the public inputs it
/// exposes and the artifacts a recursive circuit needs to verify it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageProof {
    pub proof: Proof,
    pub public_inputs: PublicInputs,
    pub artifacts: RecursiveArtifacts,
}

pub struct ProofGenerator<'a, B: Backend> {
    backend: &'a B,
}

impl<'a, B: Backend> ProofGenerator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub fn prove(&self, witness: &Witness) -> Result<(Proof, PublicInputs), ChainError> {
        self.backend.prove(witness)
    }

    /// `num_public_inputs` is the count the circuit declares; a proof exposing
    /// any other count fails with [`ChainError::ArtifactExtraction`].
    pub fn extract_artifacts(
        &self,
        proof: &Proof,
        public_inputs: &PublicInputs,
        num_public_inputs: usize,
    ) -> Result<RecursiveArtifacts, ChainError> {
        let artifacts = self
            .backend
            .recursive_artifacts(proof, public_inputs, num_public_inputs)?;
        tracing::debug!(
            circuit = self.backend.circuit().name(),
            verification_key_len = artifacts.verification_key_fields.len(),
            proof_len = artifacts.proof_fields.len(),
            "artifacts extracted"
        );
        Ok(artifacts)
    }

    /// Proves `witness` and derives the recursion artifacts of the proof.
    #[tracing::instrument(skip_all, name = "ProofGenerator::generate")]
    pub fn generate(
        &self,
        witness: &Witness,
        num_public_inputs: usize,
    ) -> Result<StageProof, ChainError> {
        let (proof, public_inputs) = self.prove(witness)?;
        let artifacts = self.extract_artifacts(&proof, &public_inputs, num_public_inputs)?;
        Ok(StageProof {
            proof,
            public_inputs,
            artifacts,
        })
    }
}

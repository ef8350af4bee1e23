//! Transparent reference backend.
//!
//! A proof is the full assignment sealed with a Keccak transcript over the
//! verification key hash and the public inputs. Verification re-checks every
//! constraint, so proofs are neither succinct nor zero-knowledge, but they are
//! sound and can be verified inside another circuit through the recursion gadget.

use std::iter;
use std::sync::Arc;

use ark_bn254::Fr;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::One;
use common::constants::SEAL_TRANSCRIPT_LABEL;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

use super::{Backend, BackendOptions, Proof, PublicInputs, Witness};
use crate::r1cs::key::{KeyDecodeError, Violation};
use crate::r1cs::{CompiledCircuit, ConstraintKey};
use crate::recursion::RecursiveArtifacts;
use crate::transcripts::{KeccakTranscript, Transcript};
use crate::utils::errors::ChainError;

/// Why an embedded proof was rejected by the recursion gadget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedProofError {
    #[error("verification key does not match its hash")]
    KeyHashMismatch,
    #[error("malformed verification key: {0}")]
    MalformedKey(KeyDecodeError),
    #[error("verification key is not recursion-capable")]
    NotRecursive,
    #[error("key hash is not the one this circuit verifies")]
    UnexpectedKey,
    #[error("proof has {actual} elements, key expects {expected}")]
    ProofLength { expected: usize, actual: usize },
    #[error("public inputs do not match the proof")]
    PublicInputMismatch,
    #[error("seal does not match the proof")]
    SealMismatch,
    #[error("proof does not satisfy its circuit: {0:?}")]
    Unsatisfied(Box<Violation>),
}

/// Seal binding an assignment to a verification key and its public inputs.
///
/// `z` must be non-empty; the constant slot is not hashed.
pub fn compute_seal(key_hash: &Fr, public_inputs: &[Fr], z: &[Fr]) -> Fr {
    let mut transcript = KeccakTranscript::new(SEAL_TRANSCRIPT_LABEL);
    transcript.append_scalar(key_hash);
    transcript.append_u64(public_inputs.len() as u64);
    transcript.append_scalars(public_inputs);
    transcript.append_scalars(&z[1..]);
    transcript.challenge_scalar()
}

/// Checks a field-encoded proof against a field-encoded verification key.
///
/// This is the relation enforced by the recursion gadget. `proof_fields` is
/// `[seal, z[1..]]`, as produced by [`TransparentBackend::recursive_artifacts`].
pub fn verify_embedded(
    verification_key: &[Fr],
    proof_fields: &[Fr],
    public_inputs: &[Fr],
    key_hash: &Fr,
) -> Result<(), EmbeddedProofError> {
    if ConstraintKey::hash_fields(verification_key) != *key_hash {
        return Err(EmbeddedProofError::KeyHashMismatch);
    }
    let key =
        ConstraintKey::from_fields(verification_key).map_err(EmbeddedProofError::MalformedKey)?;
    if !key.recursive {
        return Err(EmbeddedProofError::NotRecursive);
    }
    let length_error = EmbeddedProofError::ProofLength {
        expected: key.assignment_len,
        actual: proof_fields.len(),
    };
    if proof_fields.len() != key.assignment_len {
        return Err(length_error);
    }
    let (seal, witness) = proof_fields.split_first().ok_or(length_error)?;

    let z: Vec<Fr> = iter::once(Fr::one()).chain(witness.iter().copied()).collect();
    if key.public_inputs(&z) != public_inputs {
        return Err(EmbeddedProofError::PublicInputMismatch);
    }
    if compute_seal(key_hash, public_inputs, &z) != *seal {
        return Err(EmbeddedProofError::SealMismatch);
    }
    key.check(&z)
        .map_err(|violation| EmbeddedProofError::Unsatisfied(Box::new(violation)))
}

#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
struct TransparentProof {
    key_hash: Fr,
    seal: Fr,
    /// `z[1..]`
    assignment: Vec<Fr>,
}

pub struct TransparentBackend {
    circuit: Arc<CompiledCircuit>,
    options: BackendOptions,
    key: ConstraintKey,
    key_fields: Vec<Fr>,
    key_hash: Fr,
    pool: ThreadPool,
}

impl TransparentBackend {
    pub fn new(circuit: Arc<CompiledCircuit>, options: BackendOptions) -> Result<Self, ChainError> {
        let key = ConstraintKey::new(&circuit, options.recursive);
        let key_fields = key.to_fields();
        let key_hash = ConstraintKey::hash_fields(&key_fields);
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .thread_name(|index| format!("prover-{index}"))
            .build()
            .map_err(|e| ChainError::ProofGeneration(format!("cannot build worker pool: {e}")))?;

        Ok(Self {
            circuit,
            options,
            key,
            key_fields,
            key_hash,
            pool,
        })
    }

    pub fn key(&self) -> &ConstraintKey {
        &self.key
    }

    pub fn key_hash(&self) -> Fr {
        self.key_hash
    }

    fn decode(proof: &Proof) -> Result<TransparentProof, ChainError> {
        TransparentProof::deserialize_compressed(proof.bytes.as_slice())
            .map_err(|e| ChainError::Verification(format!("malformed proof: {e}")))
    }
}

impl Backend for TransparentBackend {
    fn name(&self) -> &'static str {
        "transparent"
    }

    fn circuit(&self) -> &CompiledCircuit {
        &self.circuit
    }

    fn options(&self) -> BackendOptions {
        self.options
    }

    #[tracing::instrument(skip_all, name = "TransparentBackend::prove")]
    fn prove(&self, witness: &Witness) -> Result<(Proof, PublicInputs), ChainError> {
        let z = witness.assignment();
        self.pool.install(|| self.key.check(z)).map_err(|violation| {
            ChainError::ProofGeneration(format!(
                "witness does not satisfy `{}`: {violation:?}",
                self.circuit.name()
            ))
        })?;

        let public_inputs = self.key.public_inputs(z);
        let proof = TransparentProof {
            key_hash: self.key_hash,
            seal: compute_seal(&self.key_hash, &public_inputs, z),
            assignment: z[1..].to_vec(),
        };
        let mut bytes = Vec::with_capacity(proof.compressed_size());
        proof
            .serialize_compressed(&mut bytes)
            .map_err(|e| ChainError::ProofGeneration(e.to_string()))?;
        tracing::debug!(
            proof_bytes = bytes.len(),
            public_inputs = public_inputs.len(),
            "proof generated"
        );

        Ok((Proof { bytes }, PublicInputs::new(public_inputs)))
    }

    fn recursive_artifacts(
        &self,
        proof: &Proof,
        public_inputs: &PublicInputs,
        num_public_inputs: usize,
    ) -> Result<RecursiveArtifacts, ChainError> {
        if num_public_inputs != public_inputs.len() {
            return Err(ChainError::ArtifactExtraction {
                declared: num_public_inputs,
                actual: public_inputs.len(),
            });
        }
        let decoded = Self::decode(proof)
            .map_err(|e| ChainError::ProofGeneration(format!("cannot extract artifacts: {e}")))?;

        let mut proof_fields = Vec::with_capacity(1 + decoded.assignment.len());
        proof_fields.push(decoded.seal);
        proof_fields.extend(decoded.assignment);

        Ok(RecursiveArtifacts {
            verification_key_fields: self.key_fields.clone(),
            proof_fields,
            verification_key_hash: self.key_hash,
        })
    }

    #[tracing::instrument(skip_all, name = "TransparentBackend::verify")]
    fn verify(&self, proof: &Proof, public_inputs: &PublicInputs) -> Result<bool, ChainError> {
        let decoded = Self::decode(proof)?;
        if decoded.key_hash != self.key_hash {
            return Err(ChainError::Verification(format!(
                "proof is bound to a different verification key than `{}`",
                self.circuit.name()
            )));
        }
        if decoded.assignment.len() + 1 != self.key.assignment_len {
            return Err(ChainError::Verification(format!(
                "proof carries {} assignment elements, `{}` expects {}",
                decoded.assignment.len() + 1,
                self.circuit.name(),
                self.key.assignment_len
            )));
        }

        let z: Vec<Fr> = iter::once(Fr::one())
            .chain(decoded.assignment.iter().copied())
            .collect();
        if self.key.public_inputs(&z) != public_inputs.values {
            tracing::debug!("public inputs do not match the proof");
            return Ok(false);
        }
        if compute_seal(&self.key_hash, &public_inputs.values, &z) != decoded.seal {
            tracing::debug!("seal mismatch");
            return Ok(false);
        }
        Ok(self.pool.install(|| self.key.check(&z)).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r1cs::CircuitBuilder;
    use ark_std::{test_rng, UniformRand};

    fn sum_circuit() -> Arc<CompiledCircuit> {
        let mut builder = CircuitBuilder::new("sum");
        let x = builder.private_input("x").unwrap();
        let y = builder.private_input("y").unwrap();
        let z = builder.public_input("z").unwrap();
        builder.constrain_eq("x + y == z", x + y, z);
        Arc::new(builder.build())
    }

    fn backend(recursive: bool) -> TransparentBackend {
        TransparentBackend::new(
            sum_circuit(),
            BackendOptions {
                threads: 1,
                recursive,
            },
        )
        .unwrap()
    }

    fn witness(x: Fr, y: Fr) -> Witness {
        Witness::from_assignment(vec![Fr::one(), x, y, x + y])
    }

    #[test]
    fn prove_then_verify() {
        let mut rng = test_rng();
        let backend = backend(true);
        let (x, y) = (Fr::rand(&mut rng), Fr::rand(&mut rng));
        let (proof, public_inputs) = backend.prove(&witness(x, y)).unwrap();
        assert_eq!(public_inputs.values, vec![x + y]);
        assert_eq!(backend.verify(&proof, &public_inputs), Ok(true));

        let wrong = PublicInputs::new(vec![x]);
        assert_eq!(backend.verify(&proof, &wrong), Ok(false));
    }

    #[test]
    fn prove_rejects_unsatisfying_witness() {
        let backend = backend(true);
        let bad = Witness::from_assignment(
            [1u64, 1, 2, 4].into_iter().map(Fr::from).collect(),
        );
        assert!(matches!(
            backend.prove(&bad),
            Err(ChainError::ProofGeneration(_))
        ));
        let short = Witness::from_assignment(vec![Fr::one()]);
        assert!(matches!(
            backend.prove(&short),
            Err(ChainError::ProofGeneration(_))
        ));
    }

    #[test]
    fn verify_distinguishes_rejection_from_unevaluable_requests() {
        let recursive = backend(true);
        let plain = backend(false);
        let (proof, public_inputs) = plain.prove(&witness(Fr::from(1u64), Fr::from(2u64))).unwrap();

        assert_eq!(plain.verify(&proof, &public_inputs), Ok(true));
        assert!(matches!(
            recursive.verify(&proof, &public_inputs),
            Err(ChainError::Verification(_))
        ));
        let garbage = Proof {
            bytes: vec![1, 2, 3],
        };
        assert!(matches!(
            plain.verify(&garbage, &public_inputs),
            Err(ChainError::Verification(_))
        ));
    }

    #[test]
    fn artifacts_check_declared_length() {
        let backend = backend(true);
        let (proof, public_inputs) = backend.prove(&witness(Fr::from(1u64), Fr::from(2u64))).unwrap();
        assert_eq!(
            backend.recursive_artifacts(&proof, &public_inputs, 2),
            Err(ChainError::ArtifactExtraction {
                declared: 2,
                actual: 1
            })
        );

        let artifacts = backend.recursive_artifacts(&proof, &public_inputs, 1).unwrap();
        assert_eq!(artifacts.verification_key_hash, backend.key_hash());
        assert_eq!(artifacts.proof_fields.len(), backend.circuit().assignment_len());
        assert_eq!(
            verify_embedded(
                &artifacts.verification_key_fields,
                &artifacts.proof_fields,
                &public_inputs.values,
                &artifacts.verification_key_hash,
            ),
            Ok(())
        );
    }

    #[test]
    fn embedded_verification_rejects_tampering() {
        let backend = backend(true);
        let (proof, public_inputs) = backend.prove(&witness(Fr::from(1u64), Fr::from(2u64))).unwrap();
        let artifacts = backend.recursive_artifacts(&proof, &public_inputs, 1).unwrap();
        let vk = &artifacts.verification_key_fields;
        let hash = artifacts.verification_key_hash;

        let mut forged = artifacts.proof_fields.clone();
        forged[1] += Fr::one();
        assert_eq!(
            verify_embedded(vk, &forged, &public_inputs.values, &hash),
            Err(EmbeddedProofError::SealMismatch)
        );
        assert_eq!(
            verify_embedded(vk, &artifacts.proof_fields, &[Fr::from(4u64)], &hash),
            Err(EmbeddedProofError::PublicInputMismatch)
        );
        assert_eq!(
            verify_embedded(vk, &artifacts.proof_fields, &public_inputs.values, &Fr::one()),
            Err(EmbeddedProofError::KeyHashMismatch)
        );
        assert!(matches!(
            verify_embedded(vk, &artifacts.proof_fields[1..], &public_inputs.values, &hash),
            Err(EmbeddedProofError::ProofLength { .. })
        ));

        let plain = self::backend(false);
        let (proof, public_inputs) = plain.prove(&witness(Fr::from(1u64), Fr::from(2u64))).unwrap();
        let artifacts = plain.recursive_artifacts(&proof, &public_inputs, 1).unwrap();
        assert_eq!(
            verify_embedded(
                &artifacts.verification_key_fields,
                &artifacts.proof_fields,
                &public_inputs.values,
                &artifacts.verification_key_hash,
            ),
            Err(EmbeddedProofError::NotRecursive)
        );
    }
}

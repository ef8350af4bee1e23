//! One-call entry points over the pipeline components.

use std::sync::Arc;

use common::inputs::InputMap;

use crate::backend::{BackendFactory, BackendOptions, Proof, PublicInputs};
use crate::host::CircuitLoader;
use crate::prover::{ProofGenerator, StageProof};
use crate::r1cs::CompiledCircuit;
use crate::recursion::{CircuitInputs, RecursiveArtifacts, RecursiveInputBuilder};
use crate::utils::errors::ChainError;
use crate::verifier::ProofVerifier;

pub fn compile(
    loader: &dyn CircuitLoader,
    circuit_id: &str,
) -> Result<Arc<CompiledCircuit>, ChainError> {
    loader.load(circuit_id)
}

/// Executes and proves `circuit` on `inputs`.
///
/// `inputs` may carry a parent proof flat, under the four reserved names.
/// Those names are never own inputs (circuits cannot declare them), so a
/// flat map is split and assembled through [`RecursiveInputBuilder`] exactly
/// like [`generate_recursive_proof`] does; a partial set is a missing input.
pub fn generate_proof(
    circuit: Arc<CompiledCircuit>,
    inputs: InputMap,
    options: BackendOptions,
) -> Result<StageProof, ChainError> {
    prove_inputs(circuit, &CircuitInputs::from_map(inputs)?, options)
}

/// Proves a recursive `circuit` that verifies the parent proof described by
/// `parent_public_inputs` and `parent_artifacts`.
pub fn generate_recursive_proof(
    circuit: Arc<CompiledCircuit>,
    parent_public_inputs: &PublicInputs,
    parent_artifacts: &RecursiveArtifacts,
    inputs: InputMap,
    options: BackendOptions,
) -> Result<StageProof, ChainError> {
    let inputs = RecursiveInputBuilder::new(parent_public_inputs, parent_artifacts)
        .with_inputs(inputs)
        .build()?;
    prove_inputs(circuit, &inputs, options)
}

pub fn verify_proof(
    circuit: Arc<CompiledCircuit>,
    proof: &Proof,
    public_inputs: &PublicInputs,
    threads: usize,
) -> Result<bool, ChainError> {
    ProofVerifier::new(threads).verify(circuit, proof, public_inputs)
}

pub(crate) fn prove_inputs(
    circuit: Arc<CompiledCircuit>,
    inputs: &CircuitInputs,
    options: BackendOptions,
) -> Result<StageProof, ChainError> {
    let declared = circuit.num_public_inputs();
    let stage = BackendFactory::new(options).bind(circuit)?;
    let witness = stage.engine().execute(inputs)?;
    ProofGenerator::new(stage.backend()).generate(&witness, declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::catalog::{main_circuit, standard_registry};
    use crate::host::{CircuitLoader, CircuitRegistry};
    use crate::r1cs::{CircuitBuilder, CompiledCircuit};
    use ark_bn254::Fr;
    use ark_std::One;
    use common::inputs::InputValue;

    fn inputs(entries: &[(&str, u64)]) -> InputMap {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), InputValue::from(*value)))
            .collect()
    }

    #[test]
    fn three_stage_chain_verifies() {
        let registry = standard_registry();
        let options = BackendOptions::default();

        let main = compile(&registry, "main").unwrap();
        let main_proof =
            generate_proof(main.clone(), inputs(&[("x", 1), ("y", 2), ("z", 3)]), options).unwrap();
        assert!(verify_proof(main, &main_proof.proof, &main_proof.public_inputs, 0).unwrap());

        let rec1 = compile(&registry, "rec1").unwrap();
        let rec1_proof = generate_recursive_proof(
            rec1,
            &main_proof.public_inputs,
            &main_proof.artifacts,
            inputs(&[("c", 3)]),
            options,
        )
        .unwrap();

        let rec2 = compile(&registry, "rec2").unwrap();
        let rec2_proof = generate_recursive_proof(
            rec2.clone(),
            &rec1_proof.public_inputs,
            &rec1_proof.artifacts,
            inputs(&[("d", 4)]),
            options,
        )
        .unwrap();
        assert!(verify_proof(rec2, &rec2_proof.proof, &rec2_proof.public_inputs, 0).unwrap());
    }

    #[test]
    fn flat_recursive_inputs_are_accepted() {
        let registry = standard_registry();
        let options = BackendOptions::default();
        let main = compile(&registry, "main").unwrap();
        let parent =
            generate_proof(main, inputs(&[("x", 2), ("y", 2), ("z", 4)]), options).unwrap();

        let rec1 = compile(&registry, "rec1").unwrap();
        let flat = RecursiveInputBuilder::new(&parent.public_inputs, &parent.artifacts)
            .with_input("c", 4u64)
            .build()
            .unwrap()
            .to_input_map();
        let stage = generate_proof(rec1.clone(), flat, options).unwrap();
        assert!(verify_proof(rec1, &stage.proof, &stage.public_inputs, 0).unwrap());
    }

    #[test]
    fn unknown_circuit_is_a_compilation_error() {
        let registry = standard_registry();
        assert!(matches!(
            compile(&registry, "nope"),
            Err(ChainError::Compilation { .. })
        ));
    }

    #[test]
    fn partial_or_misplaced_flat_recursion_fields_fail() {
        let registry = standard_registry();
        let options = BackendOptions::default();
        let main = compile(&registry, "main").unwrap();
        let parent =
            generate_proof(main.clone(), inputs(&[("x", 1), ("y", 2), ("z", 3)]), options).unwrap();

        let mut flat = RecursiveInputBuilder::new(&parent.public_inputs, &parent.artifacts)
            .with_input("c", 3u64)
            .build()
            .unwrap()
            .to_input_map();
        let rec1 = compile(&registry, "rec1").unwrap();
        flat.remove("key_hash");
        assert_eq!(
            generate_proof(rec1, flat.clone(), options).unwrap_err(),
            ChainError::MissingInput {
                name: "key_hash".to_string()
            }
        );

        flat.remove("c");
        flat.insert("key_hash".to_string(), InputValue::from(Fr::one()));
        flat.extend(inputs(&[("x", 1), ("y", 2), ("z", 3)]));
        assert!(matches!(
            generate_proof(main, flat, options),
            Err(ChainError::InvalidInput { .. })
        ));
    }

    #[test]
    fn recursion_rejects_proofs_of_a_lookalike_circuit() {
        // same name and shape as `main`, but proves `x - y == z`
        let lookalike = CircuitRegistry::new().register("main", |_: &dyn CircuitLoader| {
            let mut builder = CircuitBuilder::new("main");
            let x = builder.private_input("x")?;
            let y = builder.private_input("y")?;
            let z = builder.public_input("z")?;
            builder.constrain_eq("x - y == z", x - y, z);
            Ok::<CompiledCircuit, ChainError>(builder.build())
        });
        let options = BackendOptions::default();
        let foreign = compile(&lookalike, "main").unwrap();
        assert_ne!(*foreign, main_circuit().unwrap());
        let mut own = inputs(&[("x", 1), ("y", 2)]);
        own.insert("z".to_string(), InputValue::from(-Fr::one()));
        let foreign_proof = generate_proof(foreign, own, options).unwrap();

        let registry = standard_registry();
        let rec1 = compile(&registry, "rec1").unwrap();
        let mut c = InputMap::new();
        c.insert("c".to_string(), InputValue::from(-Fr::one()));
        let err = generate_recursive_proof(
            rec1,
            &foreign_proof.public_inputs,
            &foreign_proof.artifacts,
            c,
            options,
        )
        .unwrap_err();
        let ChainError::ConstraintUnsatisfied { constraint } = err else {
            panic!("unexpected error {err:?}");
        };
        assert!(constraint.contains("verify `main` proof"), "{constraint}");
        assert!(constraint.contains("key hash is not the one"), "{constraint}");
    }
}

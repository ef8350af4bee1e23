use ark_bn254::Fr;
use ark_std::One;
use common::inputs::{InputMap, InputValue};

use super::manifest::PipelineManifest;
use super::*;
use crate::api::{compile, generate_recursive_proof, verify_proof};
use crate::backend::Proof;
use crate::host::catalog::{standard_registry, MAIN, REC1, REC2};
use crate::recursion::RecursiveArtifacts;

fn inputs(entries: &[(&str, u64)]) -> InputMap {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), InputValue::from(*value)))
        .collect()
}

fn chain(main: &[(&str, u64)], c: u64, d: u64) -> Pipeline {
    Pipeline::new(vec![
        StageSpec::new(MAIN, inputs(main)),
        StageSpec::new(REC1, inputs(&[("c", c)])),
        StageSpec::new(REC2, inputs(&[("d", d)])),
    ])
}

fn config() -> PipelineConfig {
    PipelineConfig {
        threads: 2,
        verify_terminal: true,
    }
}

#[test]
fn standard_chain_verifies() {
    let registry = standard_registry();
    let outcome = PipelineManifest::standard_chain()
        .pipeline()
        .run(&registry, &config())
        .unwrap();

    assert_eq!(outcome.verified, Some(true));
    assert_eq!(outcome.stages.len(), 3);
    let public: Vec<_> = outcome
        .public_inputs()
        .iter()
        .map(|pi| pi.values.clone())
        .collect();
    assert_eq!(
        public,
        vec![
            vec![Fr::from(3u64)],
            vec![Fr::from(3u64)],
            vec![Fr::from(4u64)]
        ]
    );

    for report in &outcome.stages[..2] {
        assert_eq!(report.state(), Some(&StageState::ConsumedByNextStage));
    }
    let terminal = outcome.terminal().unwrap();
    assert_eq!(
        terminal.history,
        vec![
            StageState::Uncompiled,
            StageState::Compiled,
            StageState::WitnessBuilt,
            StageState::ProofBuilt,
            StageState::ArtifactsExtracted,
            StageState::Verified,
        ]
    );
    // recursion fields are recorded with the stage's own inputs
    assert!(terminal.inputs.contains_key("verification_key"));
    assert!(terminal.inputs.contains_key("d"));

    let rec2 = compile(&registry, REC2).unwrap();
    assert!(verify_proof(rec2, &terminal.proof.proof, terminal.public_inputs(), 0).unwrap());
}

#[test]
fn unsatisfied_first_stage_stops_the_pipeline() {
    let registry = standard_registry();
    let err = chain(&[("x", 1), ("y", 2), ("z", 4)], 4, 5)
        .run(&registry, &config())
        .unwrap_err();

    assert_eq!(err.stage, 0);
    assert_eq!(err.circuit, MAIN);
    assert_eq!(
        err.source,
        ChainError::ConstraintUnsatisfied {
            constraint: "x + y == z".to_string()
        }
    );
    assert_eq!(err.last_state(), "Compiled");
    assert!(matches!(err.history.last(), Some(StageState::Failed(_))));
}

#[test]
fn missing_input_fails_before_witness() {
    let registry = standard_registry();
    let err = chain(&[("x", 1), ("y", 2)], 3, 4)
        .run(&registry, &config())
        .unwrap_err();
    assert_eq!(
        err.source,
        ChainError::MissingInput {
            name: "z".to_string()
        }
    );
    assert_eq!(err.history[..2], [StageState::Uncompiled, StageState::Compiled]);
}

#[test]
fn later_stage_must_agree_with_parent_public_inputs() {
    let registry = standard_registry();
    // rec1 claims c = 5, but main exposed z = 3
    let err = chain(&[("x", 1), ("y", 2), ("z", 3)], 5, 6)
        .run(&registry, &config())
        .unwrap_err();
    assert_eq!(err.stage, 1);
    assert_eq!(err.circuit, REC1);
    assert_eq!(
        err.source,
        ChainError::ConstraintUnsatisfied {
            constraint: "c == main.z".to_string()
        }
    );
}

#[test]
fn own_inputs_colliding_with_recursion_fields_fail() {
    let registry = standard_registry();
    let mut rec1_inputs = inputs(&[("c", 3)]);
    rec1_inputs.insert("key_hash".to_string(), InputValue::from(1u64));
    let err = Pipeline::new(vec![
        StageSpec::new(MAIN, inputs(&[("x", 1), ("y", 2), ("z", 3)])),
        StageSpec::new(REC1, rec1_inputs),
    ])
    .run(&registry, &config())
    .unwrap_err();
    assert_eq!(err.stage, 1);
    assert_eq!(
        err.source,
        ChainError::RecursiveInputCollision {
            key: "key_hash".to_string()
        }
    );
}

#[test]
fn changed_upstream_inputs_change_the_final_proof() {
    let registry = standard_registry();
    let original = chain(&[("x", 1), ("y", 2), ("z", 3)], 3, 4)
        .run(&registry, &config())
        .unwrap();
    let altered = chain(&[("x", 0), ("y", 3), ("z", 3)], 3, 4)
        .run(&registry, &config())
        .unwrap();

    let original_terminal = &original.terminal().unwrap().proof;
    let altered_terminal = &altered.terminal().unwrap().proof;
    assert_eq!(
        original_terminal.public_inputs,
        altered_terminal.public_inputs
    );
    assert_ne!(original_terminal.proof, altered_terminal.proof);

    // splicing the old final proof's seal onto the new assignment is rejected
    let rec2 = compile(&registry, REC2).unwrap();
    let mut spliced = altered_terminal.proof.bytes.clone();
    let header = 64;
    spliced[..header].copy_from_slice(&original_terminal.proof.bytes[..header]);
    assert_eq!(
        verify_proof(
            rec2,
            &Proof { bytes: spliced },
            &altered_terminal.public_inputs,
            0
        ),
        Ok(false)
    );
}

#[test]
fn tampered_artifacts_are_rejected_in_circuit() {
    let registry = standard_registry();
    let outcome = Pipeline::new(vec![StageSpec::new(
        MAIN,
        inputs(&[("x", 1), ("y", 2), ("z", 3)]),
    )])
    .run(&registry, &config())
    .unwrap();
    let parent = &outcome.stages[0].proof;
    let rec1 = compile(&registry, REC1).unwrap();

    let mut forged: RecursiveArtifacts = parent.artifacts.clone();
    // x := x + 1, y := y - 1 still satisfies main but breaks the seal
    forged.proof_fields[1] += Fr::one();
    forged.proof_fields[2] -= Fr::one();
    let err = generate_recursive_proof(
        rec1.clone(),
        &parent.public_inputs,
        &forged,
        inputs(&[("c", 3)]),
        BackendOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::ConstraintUnsatisfied { .. }));

    let mut wrong_key = parent.artifacts.clone();
    wrong_key.verification_key_hash += Fr::one();
    let err = generate_recursive_proof(
        rec1,
        &parent.public_inputs,
        &wrong_key,
        inputs(&[("c", 3)]),
        BackendOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ChainError::ConstraintUnsatisfied { .. }));
}

#[test]
fn terminal_only_stage_is_verified_natively() {
    let registry = standard_registry();
    let mut stages = chain(&[("x", 1), ("y", 2), ("z", 3)], 3, 4).stages().to_vec();
    let last = stages.pop().unwrap().terminal_only();
    stages.push(last);
    let outcome = Pipeline::new(stages).run(&registry, &config()).unwrap();
    assert_eq!(outcome.verified, Some(true));

    // its key is not recursion-capable, so a default verifier does not accept it
    let terminal = outcome.terminal().unwrap();
    let rec2 = compile(&registry, REC2).unwrap();
    assert!(matches!(
        verify_proof(rec2, &terminal.proof.proof, terminal.public_inputs(), 0),
        Err(ChainError::Verification(_))
    ));
}

#[test]
fn non_recursive_parent_cannot_be_embedded() {
    let registry = standard_registry();
    let stages = vec![
        StageSpec::new(MAIN, inputs(&[("x", 1), ("y", 2), ("z", 3)])).terminal_only(),
        StageSpec::new(REC1, inputs(&[("c", 3)])),
    ];
    let err = Pipeline::new(stages).run(&registry, &config()).unwrap_err();
    assert_eq!(err.stage, 0);
    assert!(matches!(err.source, ChainError::Compilation { .. }));
    assert_eq!(err.history.len(), 2);
}

#[test]
fn terminal_verification_can_be_disabled() {
    let registry = standard_registry();
    let outcome = chain(&[("x", 1), ("y", 2), ("z", 3)], 3, 4)
        .run(
            &registry,
            &PipelineConfig {
                threads: 1,
                verify_terminal: false,
            },
        )
        .unwrap();
    assert_eq!(outcome.verified, None);
    assert_eq!(
        outcome.terminal().unwrap().state(),
        Some(&StageState::ArtifactsExtracted)
    );
}

#[test]
fn unknown_circuit_fails_at_compile() {
    let registry = standard_registry();
    let err = Pipeline::new(vec![StageSpec::new("missing", InputMap::new())])
        .run(&registry, &config())
        .unwrap_err();
    assert!(matches!(err.source, ChainError::Compilation { .. }));
    assert_eq!(err.last_state(), "Uncompiled");
    assert!(err.to_string().starts_with("stage 0 (`missing`) failed after Uncompiled"));
}

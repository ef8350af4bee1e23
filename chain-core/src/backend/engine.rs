use std::sync::Arc;

use ark_bn254::Fr;
use ark_std::{One, Zero};
use common::inputs::RecursionField;

use crate::r1cs::circuit::{Hint, SlotRange};
use crate::r1cs::key::Violation;
use crate::r1cs::ops::{evaluate_sparse, Variable, LC};
use crate::r1cs::{CompiledCircuit, ConstraintKey};
use crate::recursion::CircuitInputs;
use crate::utils::errors::ChainError;

/// Full assignment `z = [1, inputs.., auxiliaries..]` of one execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    assignment: Vec<Fr>,
}

impl Witness {
    pub fn from_assignment(assignment: Vec<Fr>) -> Self {
        Self { assignment }
    }

    pub fn assignment(&self) -> &[Fr] {
        &self.assignment
    }

    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }
}

/// Runs a circuit's witness generation against named inputs.
pub struct ExecutionEngine {
    circuit: Arc<CompiledCircuit>,
    key: ConstraintKey,
}

impl ExecutionEngine {
    pub fn new(circuit: Arc<CompiledCircuit>) -> Self {
        // The recursion flag only matters for keys handed to other circuits.
        let key = ConstraintKey::new(&circuit, true);
        Self { circuit, key }
    }

    pub fn circuit(&self) -> &CompiledCircuit {
        &self.circuit
    }

    /// Builds the witness for `inputs` and checks it against every constraint.
    ///
    /// All declared inputs are looked up before anything is evaluated, so a
    /// missing input never reaches hint evaluation.
    #[tracing::instrument(skip_all, name = "ExecutionEngine::execute", fields(circuit = %self.circuit.name()))]
    pub fn execute(&self, inputs: &CircuitInputs) -> Result<Witness, ChainError> {
        self.check_schema(inputs)?;

        let circuit = &self.circuit;
        let mut z = vec![Fr::zero(); circuit.assignment_len()];
        z[0] = Fr::one();

        for decl in circuit.inputs() {
            let value = inputs.values().get(&decl.name).ok_or_else(|| ChainError::MissingInput {
                name: decl.name.clone(),
            })?;
            match (decl.len, value.is_array()) {
                (None, true) => {
                    return Err(ChainError::invalid_input(&decl.name, "expected a scalar"));
                }
                (Some(_), false) => {
                    return Err(ChainError::invalid_input(&decl.name, "expected an array"));
                }
                _ => {}
            }
            let fields = value
                .to_fields()
                .map_err(|e| ChainError::invalid_input(&decl.name, e))?;
            Self::write(
                &mut z,
                SlotRange {
                    offset: decl.offset,
                    len: decl.num_slots(),
                },
                &decl.name,
                &fields,
            )?;
        }

        if let Some(slot) = circuit.recursion() {
            let recursion = inputs.recursion().ok_or_else(|| ChainError::MissingInput {
                name: RecursionField::VerificationKey.key().to_string(),
            })?;
            Self::write(
                &mut z,
                slot.verification_key,
                RecursionField::VerificationKey.key(),
                &recursion.verification_key,
            )?;
            Self::write(&mut z, slot.proof, RecursionField::Proof.key(), &recursion.proof)?;
            Self::write(
                &mut z,
                slot.public_inputs,
                RecursionField::PublicInputs.key(),
                &recursion.public_inputs,
            )?;
            z[1 + slot.key_hash] = recursion.key_hash;
        }

        let slot = |variable: Variable| circuit.slot(variable);
        let evaluate = |lc: &LC, z: &[Fr]| evaluate_sparse(&lc.to_sparse(slot), z);
        for (index, hint) in circuit.hints().iter().enumerate() {
            let value = match hint {
                Hint::Linear(lc) => evaluate(lc, &z),
                Hint::Product(left, right) => evaluate(left, &z) * evaluate(right, &z),
            };
            z[circuit.slot(Variable::Auxiliary(index))] = value;
        }

        self.key.check(&z).map_err(|violation| self.describe(violation))?;
        tracing::debug!(assignment_len = z.len(), "witness built");
        Ok(Witness::from_assignment(z))
    }

    fn check_schema(&self, inputs: &CircuitInputs) -> Result<(), ChainError> {
        for decl in self.circuit.inputs() {
            if !inputs.values().contains_key(&decl.name) {
                return Err(ChainError::MissingInput {
                    name: decl.name.clone(),
                });
            }
        }
        if let Some(name) = inputs
            .values()
            .keys()
            .find(|name| self.circuit.input(name).is_none())
        {
            return Err(ChainError::invalid_input(
                name.as_str(),
                format!("not declared by circuit `{}`", self.circuit.name()),
            ));
        }
        match (self.circuit.recursion(), inputs.recursion()) {
            (Some(_), None) => Err(ChainError::MissingInput {
                name: RecursionField::VerificationKey.key().to_string(),
            }),
            (None, Some(_)) => Err(ChainError::invalid_input(
                RecursionField::VerificationKey.key(),
                format!("circuit `{}` does not verify an embedded proof", self.circuit.name()),
            )),
            _ => Ok(()),
        }
    }

    fn write(z: &mut [Fr], range: SlotRange, name: &str, values: &[Fr]) -> Result<(), ChainError> {
        if values.len() != range.len {
            return Err(ChainError::invalid_input(
                name,
                format!("expected {} elements, got {}", range.len, values.len()),
            ));
        }
        z[1 + range.offset..1 + range.offset + range.len].copy_from_slice(values);
        Ok(())
    }

    fn describe(&self, violation: Violation) -> ChainError {
        let constraint = match violation {
            Violation::Constraint(index) => self.circuit.constraints()[index].label.clone(),
            Violation::Gadget(_, err) => {
                let inner = self
                    .circuit
                    .recursion()
                    .map(|slot| slot.inner_circuit.as_str())
                    .unwrap_or("embedded");
                format!("verify `{inner}` proof ({err})")
            }
            other => format!("{other:?}"),
        };
        ChainError::ConstraintUnsatisfied { constraint }
    }
}

use common::field_conversion::fr_to_be_bytes;
use common::inputs::RecursionField;

use super::{
    circuit::{CompiledCircuit, Constraint, Hint, InputDecl, RecursionSlot, SlotRange, Visibility},
    key::ConstraintKey,
    ops::{Variable, LC},
};
use crate::utils::errors::ChainError;

/// Variables bound to the four recursion fields of a recursive circuit.
#[derive(Clone, Debug)]
pub struct RecursionVars {
    pub verification_key: Vec<Variable>,
    pub proof: Vec<Variable>,
    pub public_inputs: Vec<Variable>,
    pub key_hash: Variable,
}

/// Assembles a [`CompiledCircuit`].
///
/// Input names are checked as they are declared: duplicates and the reserved
/// recursion field names are compilation errors.
pub struct CircuitBuilder {
    name: String,
    inputs: Vec<InputDecl>,
    recursion: Option<RecursionSlot>,
    hints: Vec<Hint>,
    constraints: Vec<Constraint>,
    next_slot: usize,
}

impl CircuitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            recursion: None,
            hints: Vec::new(),
            constraints: Vec::new(),
            next_slot: 0,
        }
    }

    fn declare(
        &mut self,
        name: &str,
        len: Option<usize>,
        visibility: Visibility,
    ) -> Result<Vec<Variable>, ChainError> {
        if RecursionField::is_reserved(name) {
            return Err(ChainError::compilation(
                &self.name,
                format!("input name `{name}` is reserved for recursion fields"),
            ));
        }
        if self.inputs.iter().any(|decl| decl.name == name) {
            return Err(ChainError::compilation(
                &self.name,
                format!("input `{name}` is declared twice"),
            ));
        }
        if len == Some(0) {
            return Err(ChainError::compilation(
                &self.name,
                format!("array input `{name}` must have at least one element"),
            ));
        }
        let decl = InputDecl {
            name: name.to_string(),
            len,
            visibility,
            offset: self.next_slot,
        };
        let variables = decl.slots().map(Variable::Input).collect();
        self.next_slot += decl.num_slots();
        self.inputs.push(decl);
        Ok(variables)
    }

    fn allocate_range(&mut self, len: usize) -> (SlotRange, Vec<Variable>) {
        let range = SlotRange {
            offset: self.next_slot,
            len,
        };
        self.next_slot += len;
        (range, range.slots().map(Variable::Input).collect())
    }

    pub fn public_input(&mut self, name: &str) -> Result<Variable, ChainError> {
        Ok(self.declare(name, None, Visibility::Public)?[0])
    }

    pub fn private_input(&mut self, name: &str) -> Result<Variable, ChainError> {
        Ok(self.declare(name, None, Visibility::Private)?[0])
    }

    pub fn public_array(&mut self, name: &str, len: usize) -> Result<Vec<Variable>, ChainError> {
        self.declare(name, Some(len), Visibility::Public)
    }

    pub fn private_array(&mut self, name: &str, len: usize) -> Result<Vec<Variable>, ChainError> {
        self.declare(name, Some(len), Visibility::Private)
    }

    /// Declares the recursion fields sized for proofs of `inner` and verifies
    /// the embedded proof as part of this circuit's constraints.
    ///
    /// The gadget accepts only `inner`'s recursion-capable key: its hash is
    /// pinned into this circuit, and so into this circuit's own key.
    pub fn verify_recursive_proof(
        &mut self,
        inner: &CompiledCircuit,
    ) -> Result<RecursionVars, ChainError> {
        if self.recursion.is_some() {
            return Err(ChainError::compilation(
                &self.name,
                "a circuit verifies at most one embedded proof",
            ));
        }
        let (verification_key, vk_vars) =
            self.allocate_range(ConstraintKey::encoded_len(inner));
        let (proof, proof_vars) = self.allocate_range(inner.assignment_len());
        let (public_inputs, public_vars) = self.allocate_range(inner.num_public_inputs());
        let (key_hash, key_hash_vars) = self.allocate_range(1);

        self.recursion = Some(RecursionSlot {
            inner_circuit: inner.name().to_string(),
            verification_key,
            proof,
            public_inputs,
            key_hash: key_hash.offset,
            inner_key_hash: fr_to_be_bytes(&ConstraintKey::embedded_key_hash(inner)),
        });
        Ok(RecursionVars {
            verification_key: vk_vars,
            proof: proof_vars,
            public_inputs: public_vars,
            key_hash: key_hash_vars[0],
        })
    }

    fn allocate_aux(&mut self, hint: Hint) -> Variable {
        let variable = Variable::Auxiliary(self.hints.len());
        self.hints.push(hint);
        variable
    }

    /// Allocates an auxiliary equal to `value`.
    pub fn linear(&mut self, label: &str, value: impl Into<LC>) -> Variable {
        let value: LC = value.into();
        let aux = self.allocate_aux(Hint::Linear(value.clone()));
        self.constrain_eq(label, aux, value);
        aux
    }

    /// Allocates an auxiliary equal to `left * right`.
    pub fn mul(&mut self, label: &str, left: impl Into<LC>, right: impl Into<LC>) -> Variable {
        let left: LC = left.into();
        let right: LC = right.into();
        let aux = self.allocate_aux(Hint::Product(left.clone(), right.clone()));
        self.constrain_prod(label, left, right, aux);
        aux
    }

    pub fn constrain_eq(&mut self, label: &str, left: impl Into<LC>, right: impl Into<LC>) {
        // left - right == 0
        let left: LC = left.into();
        let right: LC = right.into();

        self.constraints.push(Constraint {
            label: label.to_string(),
            a: left - right,
            b: Variable::Constant.into(),
            c: LC::zero(),
        });
    }

    pub fn constrain_prod(
        &mut self,
        label: &str,
        a: impl Into<LC>,
        b: impl Into<LC>,
        c: impl Into<LC>,
    ) {
        self.constraints.push(Constraint {
            label: label.to_string(),
            a: a.into(),
            b: b.into(),
            c: c.into(),
        });
    }

    pub fn constrain_binary(&mut self, label: &str, value: impl Into<LC>) {
        // value * (1 - value) == 0
        let a: LC = value.into();
        let b = LC::constant(1) - a.clone();
        self.constrain_prod(label, a, b, LC::zero());
    }

    pub fn build(self) -> CompiledCircuit {
        CompiledCircuit {
            name: self.name,
            inputs: self.inputs,
            recursion: self.recursion,
            hints: self.hints,
            constraints: self.constraints,
            num_input_slots: self.next_slot,
        }
    }
}

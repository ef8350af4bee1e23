use ark_bn254::Fr;
use ark_ff::PrimeField;
use common::field_conversion::fr_to_be_bytes;
use common::inputs::RecursionField;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use super::key::ConstraintKey;
use super::ops::{Variable, LC};
use crate::utils::errors::ChainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

/// One declared input of a circuit's schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDecl {
    pub name: String,
    /// `None` for a scalar, `Some(n)` for an array of `n` elements.
    pub len: Option<usize>,
    pub visibility: Visibility,
    /// First input slot occupied by this input.
    pub offset: usize,
}

impl InputDecl {
    pub fn num_slots(&self) -> usize {
        self.len.unwrap_or(1)
    }

    pub fn slots(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.num_slots()
    }
}

/// A contiguous run of input slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub offset: usize,
    pub len: usize,
}

impl SlotRange {
    pub fn slots(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Where a recursive circuit receives its parent's verification material.
///
/// Lengths are fixed when the circuit is built, from the circuit whose proofs it verifies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecursionSlot {
    /// Name of the circuit whose proofs this slot accepts.
    pub inner_circuit: String,
    pub verification_key: SlotRange,
    pub proof: SlotRange,
    pub public_inputs: SlotRange,
    pub key_hash: usize,
    /// Big-endian key hash of the inner circuit; the only key this slot accepts.
    pub inner_key_hash: [u8; 32],
}

impl RecursionSlot {
    pub fn expected_key_hash(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.inner_key_hash)
    }

    /// Checks the slot was sized and pinned for `inner`.
    pub fn check_inner(&self, inner: &CompiledCircuit) -> Result<(), String> {
        if inner.name() != self.inner_circuit {
            return Err(format!(
                "slot verifies `{}`, got `{}`",
                self.inner_circuit,
                inner.name()
            ));
        }
        let expected = [
            ("verification_key", ConstraintKey::encoded_len(inner), self.verification_key.len),
            ("proof", inner.assignment_len(), self.proof.len),
            ("public_inputs", inner.num_public_inputs(), self.public_inputs.len),
        ];
        for (field, want, have) in expected {
            if want != have {
                return Err(format!("`{field}` has {have} slots, `{}` needs {want}", inner.name()));
            }
        }
        if fr_to_be_bytes(&ConstraintKey::embedded_key_hash(inner)) != self.inner_key_hash {
            return Err(format!("pinned key hash does not match `{}`", inner.name()));
        }
        Ok(())
    }
}

/// Computes the next auxiliary value during witness generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hint {
    Linear(LC),
    Product(LC, LC),
}

/// `a * b == c`, labelled for error reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub label: String,
    pub a: LC,
    pub b: LC,
    pub c: LC,
}

/// Immutable compiled form of a circuit: its input schema, witness hints,
/// R1CS constraints and (optionally) one in-circuit proof verification.
///
/// The full assignment is laid out as `[1, inputs.., auxiliaries..]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledCircuit {
    pub(crate) name: String,
    pub(crate) inputs: Vec<InputDecl>,
    pub(crate) recursion: Option<RecursionSlot>,
    pub(crate) hints: Vec<Hint>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) num_input_slots: usize,
}

impl CompiledCircuit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[InputDecl] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&InputDecl> {
        self.inputs.iter().find(|decl| decl.name == name)
    }

    pub fn recursion(&self) -> Option<&RecursionSlot> {
        self.recursion.as_ref()
    }

    pub fn is_recursive(&self) -> bool {
        self.recursion.is_some()
    }

    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_input_slots(&self) -> usize {
        self.num_input_slots
    }

    pub fn num_aux(&self) -> usize {
        self.hints.len()
    }

    /// Length of the full assignment, including the constant slot.
    pub fn assignment_len(&self) -> usize {
        1 + self.num_input_slots + self.num_aux()
    }

    /// Position of a variable in the full assignment.
    pub fn slot(&self, variable: Variable) -> usize {
        match variable {
            Variable::Constant => 0,
            Variable::Input(index) => 1 + index,
            Variable::Auxiliary(index) => 1 + self.num_input_slots + index,
        }
    }

    /// Assignment positions of the public inputs, in declaration order.
    pub fn public_slots(&self) -> Vec<usize> {
        self.inputs
            .iter()
            .filter(|decl| decl.visibility == Visibility::Public)
            .flat_map(|decl| decl.slots())
            .map(|input| 1 + input)
            .collect()
    }

    pub fn num_public_inputs(&self) -> usize {
        self.inputs
            .iter()
            .filter(|decl| decl.visibility == Visibility::Public)
            .map(InputDecl::num_slots)
            .sum()
    }

    /// Opaque program bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ChainError> {
        postcard::to_stdvec(self).map_err(|e| ChainError::compilation(&self.name, e))
    }

    /// Decodes program bytes and checks the result with [`Self::validate`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        let circuit: Self =
            postcard::from_bytes(bytes).map_err(|e| ChainError::compilation("<bytes>", e))?;
        circuit.validate()?;
        Ok(circuit)
    }

    /// Structural checks that keep every index inside the assignment.
    pub fn validate(&self) -> Result<(), ChainError> {
        let fail = |reason: String| -> Result<(), ChainError> {
            Err(ChainError::compilation(&self.name, reason))
        };
        let mut claimed = vec![false; self.num_input_slots];
        let mut claim = |what: &str, range: std::ops::Range<usize>| -> Result<(), String> {
            if range.end > claimed.len() || range.start > range.end {
                return Err(format!(
                    "{what} occupies slots {range:?} outside {} input slots",
                    claimed.len()
                ));
            }
            for slot in range {
                if std::mem::replace(&mut claimed[slot], true) {
                    return Err(format!("{what} overlaps input slot {slot}"));
                }
            }
            Ok(())
        };

        for (index, decl) in self.inputs.iter().enumerate() {
            if RecursionField::is_reserved(&decl.name) {
                return fail(format!("input name `{}` is reserved", decl.name));
            }
            if self.inputs[..index].iter().any(|earlier| earlier.name == decl.name) {
                return fail(format!("input `{}` is declared twice", decl.name));
            }
            if decl.len == Some(0) {
                return fail(format!("array input `{}` is empty", decl.name));
            }
            let Some(end) = decl.offset.checked_add(decl.num_slots()) else {
                return fail(format!("input `{}` overflows", decl.name));
            };
            if let Err(reason) = claim(&format!("input `{}`", decl.name), decl.offset..end) {
                return fail(reason);
            }
        }

        if let Some(slot) = &self.recursion {
            let ranges = [
                ("verification_key", slot.verification_key),
                ("proof", slot.proof),
                ("public_inputs", slot.public_inputs),
                (
                    "key_hash",
                    SlotRange {
                        offset: slot.key_hash,
                        len: 1,
                    },
                ),
            ];
            for (field, range) in ranges {
                let Some(end) = range.offset.checked_add(range.len) else {
                    return fail(format!("recursion field `{field}` overflows"));
                };
                if let Err(reason) = claim(&format!("recursion field `{field}`"), range.offset..end) {
                    return fail(reason);
                }
            }
        }

        let in_range = |variable: Variable, num_aux: usize| match variable {
            Variable::Constant => true,
            Variable::Input(index) => index < self.num_input_slots,
            Variable::Auxiliary(index) => index < num_aux,
        };
        let check_lc = |lc: &LC, num_aux: usize| {
            lc.terms()
                .iter()
                .find(|term| !in_range(term.0, num_aux))
                .map(|term| term.0)
        };

        for (index, hint) in self.hints.iter().enumerate() {
            let lcs: Vec<&LC> = match hint {
                Hint::Linear(lc) => vec![lc],
                Hint::Product(left, right) => vec![left, right],
            };
            // hints run in order, so each may only read earlier auxiliaries
            if let Some(variable) = lcs.into_iter().find_map(|lc| check_lc(lc, index)) {
                return fail(format!("hint {index} reads {variable:?} before it is assigned"));
            }
        }
        for constraint in &self.constraints {
            let bad = [&constraint.a, &constraint.b, &constraint.c]
                .into_iter()
                .find_map(|lc| check_lc(lc, self.hints.len()));
            if let Some(variable) = bad {
                return fail(format!(
                    "constraint `{}` uses unallocated {variable:?}",
                    constraint.label
                ));
            }
        }
        Ok(())
    }

    /// Keccak digest of the program bytes; identifies the circuit in caches and logs.
    pub fn digest(&self) -> Result<[u8; 32], ChainError> {
        let bytes = self.to_bytes()?;
        Ok(Keccak256::digest(&bytes).into())
    }
}

//! Field-native encoding of a circuit's verification data.
//!
//! A [`ConstraintKey`] is what a verifier needs to check a full assignment:
//! the R1CS rows as sparse `(slot, coefficient)` lists, the public slots and
//! the location of every embedded proof. It encodes to an ordered sequence of
//! field elements so that a recursive circuit can receive it as an input:
//!
//! ```text
//! [version, recursive, assignment_len, n_public, public_slots..,
//!  n_constraints, (n_a, (slot, coeff)*, n_b, .., n_c, ..)*,
//!  n_gadgets, (vk_off, vk_len, proof_off, proof_len, pi_off, pi_len, key_hash, inner_hash)*]
//! ```

use ark_bn254::Fr;
use ark_std::One;
use common::constants::{
    GADGET_KEY_LEN, KEY_HASH_TRANSCRIPT_LABEL, VERIFICATION_KEY_HEADER_LEN,
    VERIFICATION_KEY_VERSION,
};
use common::field_conversion::{fr_from_index, fr_to_index};
use rayon::prelude::*;
use thiserror::Error;

use super::circuit::CompiledCircuit;
use super::ops::{evaluate_sparse, SparseTerms, Variable};
use crate::backend::transparent::{verify_embedded, EmbeddedProofError};
use crate::transcripts::hash_scalars;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyDecodeError {
    #[error("verification key ends early at element {0}")]
    Truncated(usize),
    #[error("verification key has {0} trailing elements")]
    TrailingElements(usize),
    #[error("unsupported verification key version")]
    UnsupportedVersion,
    #[error("element {0} is not a valid index or flag")]
    InvalidIndex(usize),
    #[error("element {0} points outside the assignment")]
    OutOfBounds(usize),
}

/// First check a full assignment fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    AssignmentLength { expected: usize, actual: usize },
    ConstantSlot,
    Constraint(usize),
    Gadget(usize, EmbeddedProofError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SparseConstraint {
    pub a: SparseTerms,
    pub b: SparseTerms,
    pub c: SparseTerms,
}

impl SparseConstraint {
    pub fn is_satisfied(&self, z: &[Fr]) -> bool {
        evaluate_sparse(&self.a, z) * evaluate_sparse(&self.b, z) == evaluate_sparse(&self.c, z)
    }
}

/// Assignment ranges holding one embedded proof's verification material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GadgetKey {
    pub verification_key: (usize, usize),
    pub proof: (usize, usize),
    pub public_inputs: (usize, usize),
    pub key_hash: usize,
    /// Key hash of the only circuit whose proofs this gadget accepts.
    pub inner_key_hash: Fr,
}

impl GadgetKey {
    fn slice(z: &[Fr], (offset, len): (usize, usize)) -> &[Fr] {
        &z[offset..offset + len]
    }

    pub fn check(&self, z: &[Fr]) -> Result<(), EmbeddedProofError> {
        if z[self.key_hash] != self.inner_key_hash {
            return Err(EmbeddedProofError::UnexpectedKey);
        }
        verify_embedded(
            Self::slice(z, self.verification_key),
            Self::slice(z, self.proof),
            Self::slice(z, self.public_inputs),
            &z[self.key_hash],
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintKey {
    pub recursive: bool,
    pub assignment_len: usize,
    pub public_slots: Vec<usize>,
    pub constraints: Vec<SparseConstraint>,
    pub gadgets: Vec<GadgetKey>,
}

impl ConstraintKey {
    pub fn new(circuit: &CompiledCircuit, recursive: bool) -> Self {
        let slot = |variable: Variable| circuit.slot(variable);
        let constraints = circuit
            .constraints()
            .iter()
            .map(|constraint| SparseConstraint {
                a: constraint.a.to_sparse(slot),
                b: constraint.b.to_sparse(slot),
                c: constraint.c.to_sparse(slot),
            })
            .collect();
        let gadgets = circuit
            .recursion()
            .map(|recursion| GadgetKey {
                verification_key: (
                    1 + recursion.verification_key.offset,
                    recursion.verification_key.len,
                ),
                proof: (1 + recursion.proof.offset, recursion.proof.len),
                public_inputs: (1 + recursion.public_inputs.offset, recursion.public_inputs.len),
                key_hash: 1 + recursion.key_hash,
                inner_key_hash: recursion.expected_key_hash(),
            })
            .into_iter()
            .collect();

        Self {
            recursive,
            assignment_len: circuit.assignment_len(),
            public_slots: circuit.public_slots(),
            constraints,
            gadgets,
        }
    }

    /// Number of field elements in the encoded key of `circuit`.
    pub fn encoded_len(circuit: &CompiledCircuit) -> usize {
        Self::new(circuit, true).num_fields()
    }

    /// Hash of the recursion-capable key of `inner`; what a slot verifying `inner` pins.
    pub fn embedded_key_hash(inner: &CompiledCircuit) -> Fr {
        Self::hash_fields(&Self::new(inner, true).to_fields())
    }

    pub fn num_fields(&self) -> usize {
        let rows: usize = self
            .constraints
            .iter()
            .map(|row| 3 + 2 * (row.a.len() + row.b.len() + row.c.len()))
            .sum();
        VERIFICATION_KEY_HEADER_LEN
            + self.public_slots.len()
            + 1
            + rows
            + 1
            + GADGET_KEY_LEN * self.gadgets.len()
    }

    pub fn to_fields(&self) -> Vec<Fr> {
        let mut fields = Vec::with_capacity(self.num_fields());
        fields.push(Fr::from(VERIFICATION_KEY_VERSION));
        fields.push(Fr::from(self.recursive as u64));
        fields.push(fr_from_index(self.assignment_len));
        fields.push(fr_from_index(self.public_slots.len()));
        fields.extend(self.public_slots.iter().copied().map(fr_from_index));

        fields.push(fr_from_index(self.constraints.len()));
        for row in &self.constraints {
            for terms in [&row.a, &row.b, &row.c] {
                fields.push(fr_from_index(terms.len()));
                for (slot, coeff) in terms {
                    fields.push(fr_from_index(*slot));
                    fields.push(*coeff);
                }
            }
        }

        fields.push(fr_from_index(self.gadgets.len()));
        for gadget in &self.gadgets {
            fields.extend(
                [
                    gadget.verification_key.0,
                    gadget.verification_key.1,
                    gadget.proof.0,
                    gadget.proof.1,
                    gadget.public_inputs.0,
                    gadget.public_inputs.1,
                    gadget.key_hash,
                ]
                .map(fr_from_index),
            );
            fields.push(gadget.inner_key_hash);
        }
        fields
    }

    pub fn from_fields(fields: &[Fr]) -> Result<Self, KeyDecodeError> {
        let mut reader = FieldReader::new(fields);

        if reader.next()? != Fr::from(VERIFICATION_KEY_VERSION) {
            return Err(KeyDecodeError::UnsupportedVersion);
        }
        let recursive = match reader.next_index()? {
            0 => false,
            1 => true,
            _ => return Err(KeyDecodeError::InvalidIndex(reader.position - 1)),
        };
        let assignment_len = reader.next_index()?;
        if assignment_len == 0 {
            return Err(KeyDecodeError::InvalidIndex(reader.position - 1));
        }

        let num_public = reader.next_index()?;
        let mut public_slots = Vec::with_capacity(num_public.min(fields.len()));
        for _ in 0..num_public {
            public_slots.push(reader.next_slot(assignment_len)?);
        }

        let num_constraints = reader.next_index()?;
        let mut constraints = Vec::with_capacity(num_constraints.min(fields.len()));
        for _ in 0..num_constraints {
            let a = reader.next_terms(assignment_len)?;
            let b = reader.next_terms(assignment_len)?;
            let c = reader.next_terms(assignment_len)?;
            constraints.push(SparseConstraint { a, b, c });
        }

        let num_gadgets = reader.next_index()?;
        let mut gadgets = Vec::with_capacity(num_gadgets.min(fields.len()));
        for _ in 0..num_gadgets {
            gadgets.push(GadgetKey {
                verification_key: reader.next_range(assignment_len)?,
                proof: reader.next_range(assignment_len)?,
                public_inputs: reader.next_range(assignment_len)?,
                key_hash: reader.next_slot(assignment_len)?,
                inner_key_hash: reader.next()?,
            });
        }

        let trailing = fields.len() - reader.position;
        if trailing != 0 {
            return Err(KeyDecodeError::TrailingElements(trailing));
        }

        Ok(Self {
            recursive,
            assignment_len,
            public_slots,
            constraints,
            gadgets,
        })
    }

    /// Hash committing to an encoded key; what recursive circuits receive as `key_hash`.
    pub fn hash_fields(fields: &[Fr]) -> Fr {
        hash_scalars(KEY_HASH_TRANSCRIPT_LABEL, fields)
    }

    pub fn public_inputs(&self, z: &[Fr]) -> Vec<Fr> {
        self.public_slots.iter().map(|slot| z[*slot]).collect()
    }

    /// Checks every constraint and every embedded proof against a full assignment.
    ///
    /// Rows are checked on the current rayon pool.
    pub fn check(&self, z: &[Fr]) -> Result<(), Violation> {
        if z.len() != self.assignment_len {
            return Err(Violation::AssignmentLength {
                expected: self.assignment_len,
                actual: z.len(),
            });
        }
        if !z[0].is_one() {
            return Err(Violation::ConstantSlot);
        }
        if let Some(index) = self
            .constraints
            .par_iter()
            .position_first(|row| !row.is_satisfied(z))
        {
            return Err(Violation::Constraint(index));
        }
        for (index, gadget) in self.gadgets.iter().enumerate() {
            gadget
                .check(z)
                .map_err(|err| Violation::Gadget(index, err))?;
        }
        Ok(())
    }
}

struct FieldReader<'a> {
    fields: &'a [Fr],
    position: usize,
}

impl<'a> FieldReader<'a> {
    fn new(fields: &'a [Fr]) -> Self {
        Self {
            fields,
            position: 0,
        }
    }

    fn next(&mut self) -> Result<Fr, KeyDecodeError> {
        let value = self
            .fields
            .get(self.position)
            .copied()
            .ok_or(KeyDecodeError::Truncated(self.position))?;
        self.position += 1;
        Ok(value)
    }

    fn next_index(&mut self) -> Result<usize, KeyDecodeError> {
        let position = self.position;
        let value = self.next()?;
        fr_to_index(&value).ok_or(KeyDecodeError::InvalidIndex(position))
    }

    fn next_slot(&mut self, assignment_len: usize) -> Result<usize, KeyDecodeError> {
        let position = self.position;
        let slot = self.next_index()?;
        if slot >= assignment_len {
            return Err(KeyDecodeError::OutOfBounds(position));
        }
        Ok(slot)
    }

    fn next_range(&mut self, assignment_len: usize) -> Result<(usize, usize), KeyDecodeError> {
        let position = self.position;
        let offset = self.next_index()?;
        let len = self.next_index()?;
        match offset.checked_add(len) {
            Some(end) if end <= assignment_len => Ok((offset, len)),
            _ => Err(KeyDecodeError::OutOfBounds(position)),
        }
    }

    fn next_terms(&mut self, assignment_len: usize) -> Result<SparseTerms, KeyDecodeError> {
        let len = self.next_index()?;
        if len > self.fields.len() {
            return Err(KeyDecodeError::Truncated(self.fields.len()));
        }
        let mut terms = Vec::with_capacity(len);
        for _ in 0..len {
            let slot = self.next_slot(assignment_len)?;
            let coeff = self.next()?;
            terms.push((slot, coeff));
        }
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::Zero;
    use crate::r1cs::builder::CircuitBuilder;
    use crate::r1cs::ops::LC;

    fn product_circuit() -> CompiledCircuit {
        let mut builder = CircuitBuilder::new("product");
        let a = builder.private_input("a").unwrap();
        let b = builder.private_input("b").unwrap();
        let out = builder.public_input("out").unwrap();
        let ab = builder.mul("a * b", a, b);
        builder.constrain_eq("ab + 1 == out", ab + LC::constant(1), out);
        builder.build()
    }

    fn assignment(values: &[u64]) -> Vec<Fr> {
        values.iter().copied().map(Fr::from).collect()
    }

    #[test]
    fn encoding_preserves_key() {
        let circuit = product_circuit();
        let key = ConstraintKey::new(&circuit, true);
        let fields = key.to_fields();
        assert_eq!(fields.len(), key.num_fields());
        assert_eq!(fields.len(), ConstraintKey::encoded_len(&circuit));
        assert_eq!(ConstraintKey::from_fields(&fields).unwrap(), key);
        assert_eq!(fields[1], Fr::one());

        let plain = ConstraintKey::new(&circuit, false).to_fields();
        assert_eq!(plain.len(), fields.len());
        assert!(plain[1].is_zero());
        assert_ne!(
            ConstraintKey::hash_fields(&plain),
            ConstraintKey::hash_fields(&fields)
        );
    }

    #[test]
    fn decoding_rejects_malformed_keys() {
        let fields = ConstraintKey::new(&product_circuit(), true).to_fields();

        let truncated = &fields[..fields.len() - 1];
        assert!(matches!(
            ConstraintKey::from_fields(truncated),
            Err(KeyDecodeError::Truncated(_))
        ));

        let mut extended = fields.clone();
        extended.push(Fr::zero());
        assert_eq!(
            ConstraintKey::from_fields(&extended),
            Err(KeyDecodeError::TrailingElements(1))
        );

        let mut wrong_version = fields.clone();
        wrong_version[0] = Fr::from(99u64);
        assert_eq!(
            ConstraintKey::from_fields(&wrong_version),
            Err(KeyDecodeError::UnsupportedVersion)
        );

        let mut bad_slot = fields;
        // first public slot
        bad_slot[VERIFICATION_KEY_HEADER_LEN] = Fr::from(1000u64);
        assert_eq!(
            ConstraintKey::from_fields(&bad_slot),
            Err(KeyDecodeError::OutOfBounds(VERIFICATION_KEY_HEADER_LEN))
        );
    }

    #[test]
    fn check_reports_first_failing_row() {
        let key = ConstraintKey::new(&product_circuit(), true);
        // z = [1, a, b, out, ab]
        assert_eq!(key.check(&assignment(&[1, 3, 4, 13, 12])), Ok(()));
        assert_eq!(
            key.check(&assignment(&[1, 3, 4, 13, 11])),
            Err(Violation::Constraint(0))
        );
        assert_eq!(
            key.check(&assignment(&[1, 3, 4, 14, 12])),
            Err(Violation::Constraint(1))
        );
        assert_eq!(
            key.check(&assignment(&[0, 3, 4, 13, 12])),
            Err(Violation::ConstantSlot)
        );
        assert_eq!(
            key.check(&assignment(&[1, 3, 4])),
            Err(Violation::AssignmentLength {
                expected: 5,
                actual: 3
            })
        );
        assert_eq!(key.public_inputs(&assignment(&[1, 3, 4, 13, 12])), assignment(&[13]));
    }
}

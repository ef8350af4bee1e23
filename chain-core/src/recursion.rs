//! Handing a proof from one stage to the next.
//!
//! A recursive circuit receives its parent's proof under four reserved input
//! names (see [`RecursionField`]). [`RecursiveInputBuilder`] assembles those
//! fields from a parent's [`RecursiveArtifacts`] and merges the stage's own inputs.

use ark_bn254::Fr;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use common::field_conversion::fr_to_decimal;
use common::inputs::{InputMap, InputValue, RecursionField};

use crate::backend::PublicInputs;
use crate::utils::errors::ChainError;
use crate::utils::serializable::Serializable;

/// Field-encoded verification material a recursive circuit consumes.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct RecursiveArtifacts {
    pub verification_key_fields: Vec<Fr>,
    pub proof_fields: Vec<Fr>,
    pub verification_key_hash: Fr,
}

impl Serializable for RecursiveArtifacts {}

/// The recursion fields of a stage's inputs, kept typed until execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecursionInputs {
    pub verification_key: Vec<Fr>,
    pub proof: Vec<Fr>,
    pub public_inputs: Vec<Fr>,
    pub key_hash: Fr,
}

impl RecursionInputs {
    pub fn new(parent_public_inputs: &PublicInputs, parent_artifacts: &RecursiveArtifacts) -> Self {
        Self {
            verification_key: parent_artifacts.verification_key_fields.clone(),
            proof: parent_artifacts.proof_fields.clone(),
            public_inputs: parent_public_inputs.values.clone(),
            key_hash: parent_artifacts.verification_key_hash,
        }
    }

    /// Renders the fields under their reserved names, elements as decimal strings.
    pub fn to_input_map(&self) -> InputMap {
        let mut map = InputMap::new();
        map.insert(
            RecursionField::VerificationKey.key().to_string(),
            InputValue::from(self.verification_key.as_slice()),
        );
        map.insert(
            RecursionField::Proof.key().to_string(),
            InputValue::from(self.proof.as_slice()),
        );
        map.insert(
            RecursionField::PublicInputs.key().to_string(),
            InputValue::from(self.public_inputs.as_slice()),
        );
        map.insert(
            RecursionField::KeyHash.key().to_string(),
            InputValue::Scalar(fr_to_decimal(&self.key_hash)),
        );
        map
    }

    /// Parses the reserved entries of `map`. `Ok(None)` if none are present.
    pub fn from_input_map(map: &InputMap) -> Result<Option<Self>, ChainError> {
        if !map.keys().any(|name| RecursionField::is_reserved(name)) {
            return Ok(None);
        }
        let field = |field: RecursionField, array: bool| -> Result<Vec<Fr>, ChainError> {
            let name = field.key();
            let value = map.get(name).ok_or_else(|| ChainError::MissingInput {
                name: name.to_string(),
            })?;
            if value.is_array() != array {
                let expected = if array { "an array" } else { "a scalar" };
                return Err(ChainError::invalid_input(name, format!("expected {expected}")));
            }
            value.to_fields().map_err(|e| ChainError::invalid_input(name, e))
        };

        Ok(Some(Self {
            verification_key: field(RecursionField::VerificationKey, true)?,
            proof: field(RecursionField::Proof, true)?,
            public_inputs: field(RecursionField::PublicInputs, true)?,
            key_hash: field(RecursionField::KeyHash, false)?[0],
        }))
    }
}

/// Inputs of one circuit execution: the circuit's own named inputs plus,
/// for a recursive circuit, its parent's proof.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CircuitInputs {
    values: InputMap,
    recursion: Option<RecursionInputs>,
}

impl CircuitInputs {
    /// Splits a flat map into own inputs and recursion fields.
    ///
    /// Reserved names are always read as recursion fields, all four or none,
    /// and the result is assembled by [`RecursiveInputBuilder`].
    pub fn from_map(map: InputMap) -> Result<Self, ChainError> {
        let Some(recursion) = RecursionInputs::from_input_map(&map)? else {
            return Ok(map.into());
        };
        let own = map
            .into_iter()
            .filter(|(name, _)| !RecursionField::is_reserved(name))
            .collect();
        RecursiveInputBuilder::from_recursion(recursion)
            .with_inputs(own)
            .build()
    }

    pub fn values(&self) -> &InputMap {
        &self.values
    }

    pub fn recursion(&self) -> Option<&RecursionInputs> {
        self.recursion.as_ref()
    }

    /// Flat view with the recursion fields under their reserved names.
    pub fn to_input_map(&self) -> InputMap {
        let mut map = self.values.clone();
        if let Some(recursion) = &self.recursion {
            map.extend(recursion.to_input_map());
        }
        map
    }
}

impl From<InputMap> for CircuitInputs {
    fn from(values: InputMap) -> Self {
        Self {
            values,
            recursion: None,
        }
    }
}

pub struct RecursiveInputBuilder {
    recursion: RecursionInputs,
    own: InputMap,
}

impl RecursiveInputBuilder {
    pub fn new(parent_public_inputs: &PublicInputs, parent_artifacts: &RecursiveArtifacts) -> Self {
        Self::from_recursion(RecursionInputs::new(parent_public_inputs, parent_artifacts))
    }

    pub fn from_recursion(recursion: RecursionInputs) -> Self {
        Self {
            recursion,
            own: InputMap::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.own.insert(name.into(), value.into());
        self
    }

    pub fn with_inputs(mut self, inputs: InputMap) -> Self {
        self.own.extend(inputs);
        self
    }

    pub fn build(self) -> Result<CircuitInputs, ChainError> {
        if let Some(key) = self.own.keys().find(|name| RecursionField::is_reserved(name)) {
            return Err(ChainError::RecursiveInputCollision { key: key.clone() });
        }
        Ok(CircuitInputs {
            values: self.own,
            recursion: Some(self.recursion),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_std::{test_rng, UniformRand};

    fn artifacts() -> (PublicInputs, RecursiveArtifacts) {
        let mut rng = test_rng();
        let mut sample = |n: usize| (0..n).map(|_| Fr::rand(&mut rng)).collect::<Vec<_>>();
        let public_inputs = PublicInputs::new(sample(2));
        let artifacts = RecursiveArtifacts {
            verification_key_fields: sample(5),
            proof_fields: sample(3),
            verification_key_hash: sample(1)[0],
        };
        (public_inputs, artifacts)
    }

    #[test]
    fn builder_merges_parent_and_own_inputs() {
        let (public_inputs, artifacts) = artifacts();
        let inputs = RecursiveInputBuilder::new(&public_inputs, &artifacts)
            .with_input("c", 3u64)
            .build()
            .unwrap();

        assert_eq!(inputs.values().len(), 1);
        let recursion = inputs.recursion().unwrap();
        assert_eq!(recursion.public_inputs, public_inputs.values);
        assert_eq!(recursion.proof, artifacts.proof_fields);

        let flat = inputs.to_input_map();
        assert_eq!(flat.len(), 5);
        assert_eq!(
            flat["key_hash"],
            InputValue::Scalar(fr_to_decimal(&artifacts.verification_key_hash))
        );
        let InputValue::Array(vk) = &flat["verification_key"] else {
            panic!("verification_key is not an array");
        };
        assert_eq!(vk.len(), artifacts.verification_key_fields.len());
        assert_eq!(
            vk[0],
            InputValue::Scalar(fr_to_decimal(&artifacts.verification_key_fields[0]))
        );

        assert_eq!(CircuitInputs::from_map(flat).unwrap(), inputs);
    }

    #[test]
    fn own_inputs_may_not_use_reserved_names() {
        let (public_inputs, artifacts) = artifacts();
        for reserved in ["verification_key", "proof", "public_inputs", "key_hash"] {
            let err = RecursiveInputBuilder::new(&public_inputs, &artifacts)
                .with_input("c", 3u64)
                .with_input(reserved, 1u64)
                .build()
                .unwrap_err();
            assert_eq!(
                err,
                ChainError::RecursiveInputCollision {
                    key: reserved.to_string()
                }
            );
        }
    }

    #[test]
    fn partial_recursion_fields_are_missing_inputs() {
        let mut map = InputMap::new();
        map.insert("proof".to_string(), InputValue::Array(vec![1u64.into()]));
        assert_eq!(
            CircuitInputs::from_map(map).unwrap_err(),
            ChainError::MissingInput {
                name: "verification_key".to_string()
            }
        );

        let plain: InputMap = [("x".to_string(), InputValue::from(1u64))].into();
        let inputs = CircuitInputs::from_map(plain).unwrap();
        assert!(inputs.recursion().is_none());
    }
}

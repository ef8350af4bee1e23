use std::collections::BTreeMap;

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{EnumCount, EnumIter, IntoStaticStr};

use crate::field_conversion::{fr_from_str, fr_to_decimal, FieldParseError};

/// Named inputs of one circuit execution. Ordered so that rendering is deterministic.
pub type InputMap = BTreeMap<String, InputValue>;

/// A raw input value as it appears in a manifest or input map.
///
/// Scalars are integers or strings in decimal / `0x` hex; arrays nest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
#[serde(untagged)]
pub enum InputValue {
    Integer(u64),
    Scalar(String),
    Array(Vec<InputValue>),
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Scalar(value.to_string())
    }
}

impl From<Fr> for InputValue {
    fn from(value: Fr) -> Self {
        InputValue::Scalar(fr_to_decimal(&value))
    }
}

impl From<&[Fr]> for InputValue {
    fn from(values: &[Fr]) -> Self {
        InputValue::Array(values.iter().copied().map(InputValue::from).collect())
    }
}

impl InputValue {
    pub fn is_array(&self) -> bool {
        matches!(self, InputValue::Array(_))
    }

    /// Flattens the value into field elements, depth first.
    pub fn to_fields(&self) -> Result<Vec<Fr>, FieldParseError> {
        let mut fields = Vec::new();
        self.flatten_into(&mut fields)?;
        Ok(fields)
    }

    fn flatten_into(&self, out: &mut Vec<Fr>) -> Result<(), FieldParseError> {
        match self {
            InputValue::Integer(value) => out.push(Fr::from(*value)),
            InputValue::Scalar(value) => out.push(fr_from_str(value)?),
            InputValue::Array(values) => {
                for value in values {
                    value.flatten_into(out)?;
                }
            }
        }
        Ok(())
    }
}

/// The four input names under which a parent proof is handed to a recursive circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RecursionField {
    VerificationKey,
    Proof,
    PublicInputs,
    KeyHash,
}

impl RecursionField {
    pub fn key(self) -> &'static str {
        self.into()
    }

    pub fn from_key(name: &str) -> Option<Self> {
        Self::iter().find(|field| field.key() == name)
    }

    pub fn is_reserved(name: &str) -> bool {
        Self::from_key(name).is_some()
    }
}

//! Circuits of the standard three-stage chain.
//!
//! `main` proves `x + y == z` for a public `z`. `rec1` verifies a `main`
//! proof and exposes its `z` as `c`. `rec2` verifies a `rec1` proof and
//! exposes `d == c + 1`.

use super::{CircuitLoader, CircuitRegistry};
use crate::r1cs::ops::LC;
use crate::r1cs::{CircuitBuilder, CompiledCircuit};
use crate::utils::errors::ChainError;

pub const MAIN: &str = "main";
pub const REC1: &str = "rec1";
pub const REC2: &str = "rec2";

pub fn main_circuit() -> Result<CompiledCircuit, ChainError> {
    let mut builder = CircuitBuilder::new(MAIN);
    let x = builder.private_input("x")?;
    let y = builder.private_input("y")?;
    let z = builder.public_input("z")?;
    builder.constrain_eq("x + y == z", x + y, z);
    Ok(builder.build())
}

pub fn rec1_circuit(main: &CompiledCircuit) -> Result<CompiledCircuit, ChainError> {
    let mut builder = CircuitBuilder::new(REC1);
    let c = builder.public_input("c")?;
    let parent = builder.verify_recursive_proof(main)?;
    let z = *parent
        .public_inputs
        .first()
        .ok_or_else(|| ChainError::compilation(REC1, "parent exposes no public inputs"))?;
    builder.constrain_eq("c == main.z", c, z);
    Ok(builder.build())
}

pub fn rec2_circuit(rec1: &CompiledCircuit) -> Result<CompiledCircuit, ChainError> {
    let mut builder = CircuitBuilder::new(REC2);
    let d = builder.public_input("d")?;
    let parent = builder.verify_recursive_proof(rec1)?;
    let c = *parent
        .public_inputs
        .first()
        .ok_or_else(|| ChainError::compilation(REC2, "parent exposes no public inputs"))?;
    builder.constrain_eq("d == rec1.c + 1", d, c + LC::constant(1));
    Ok(builder.build())
}

pub fn standard_registry() -> CircuitRegistry {
    CircuitRegistry::new()
        .register(MAIN, |_: &dyn CircuitLoader| main_circuit())
        .register(REC1, |loader: &dyn CircuitLoader| {
            rec1_circuit(&*loader.load(MAIN)?)
        })
        .register(REC2, |loader: &dyn CircuitLoader| {
            rec2_circuit(&*loader.load(REC1)?)
        })
}

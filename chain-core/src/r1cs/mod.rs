pub mod builder;
pub mod circuit;
pub mod key;
pub mod ops;

pub use builder::{CircuitBuilder, RecursionVars};
pub use circuit::{CompiledCircuit, InputDecl, RecursionSlot, Visibility};
pub use key::ConstraintKey;

use thiserror::Error;

/// Failures of a single pipeline step.
///
/// A rejected proof is not an error: verification reports it as `Ok(false)`.
/// `Verification` is reserved for requests the backend cannot evaluate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Failed to compile circuit `{circuit}`: {reason}")]
    Compilation { circuit: String, reason: String },
    #[error("Missing input `{name}`")]
    MissingInput { name: String },
    #[error("Invalid input `{name}`: {reason}")]
    InvalidInput { name: String, reason: String },
    #[error("Constraint `{constraint}` is not satisfied")]
    ConstraintUnsatisfied { constraint: String },
    #[error("Proof generation failed: {0}")]
    ProofGeneration(String),
    #[error("Invalid public input length, declared {declared} but the proof exposes {actual}")]
    ArtifactExtraction { declared: usize, actual: usize },
    #[error("Input `{key}` collides with a recursion field")]
    RecursiveInputCollision { key: String },
    #[error("Verification could not be evaluated: {0}")]
    Verification(String),
}

impl ChainError {
    pub fn compilation(circuit: impl Into<String>, reason: impl ToString) -> Self {
        ChainError::Compilation {
            circuit: circuit.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_input(name: impl Into<String>, reason: impl ToString) -> Self {
        ChainError::InvalidInput {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

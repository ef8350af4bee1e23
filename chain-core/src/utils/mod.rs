pub mod errors;
pub mod serializable;

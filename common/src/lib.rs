pub mod constants;
pub mod field_conversion;
pub mod inputs;
pub mod serializable;

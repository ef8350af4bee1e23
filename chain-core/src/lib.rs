#![allow(clippy::len_without_is_empty)]
#![allow(clippy::too_long_first_doc_paragraph)]

pub mod api;
pub mod backend;
pub mod host;
pub mod pipeline;
pub mod prover;
pub mod r1cs;
pub mod recursion;
pub mod transcripts;
pub mod utils;
pub mod verifier;

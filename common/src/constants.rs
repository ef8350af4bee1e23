/// Worker threads used by a proving backend when none are configured.
/// Zero defers to rayon's default (one per logical core).
pub const DEFAULT_PROVER_THREADS: usize = 0;

/// Leading element of every encoded verification key.
pub const VERIFICATION_KEY_VERSION: u64 = 1;

/// Number of header elements preceding the public slots in a verification key:
/// version, recursion flag, assignment length, public input count.
pub const VERIFICATION_KEY_HEADER_LEN: usize = 4;

/// Number of field elements describing one recursion gadget in a verification key.
pub const GADGET_KEY_LEN: usize = 8;

pub const SEAL_TRANSCRIPT_LABEL: &[u8] = b"proof_chain_seal";
pub const KEY_HASH_TRANSCRIPT_LABEL: &[u8] = b"proof_chain_verification_key";

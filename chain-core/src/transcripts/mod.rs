mod keccak;

pub use keccak::KeccakTranscript;

use ark_ff::PrimeField;

pub trait Transcript: Clone + Sync + Send + 'static {
    fn new(label: &'static [u8]) -> Self;
    fn append_message(&mut self, msg: &'static [u8]);
    fn append_bytes(&mut self, bytes: &[u8]);
    fn append_u64(&mut self, x: u64);
    fn append_scalar<F: PrimeField>(&mut self, scalar: &F);
    fn append_scalars<F: PrimeField>(&mut self, scalars: &[F]);
    fn challenge_scalar<F: PrimeField>(&mut self) -> F;
}

/// Hashes an ordered sequence of field elements to a single field element.
pub fn hash_scalars<F: PrimeField>(label: &'static [u8], scalars: &[F]) -> F {
    let mut transcript = KeccakTranscript::new(label);
    transcript.append_u64(scalars.len() as u64);
    transcript.append_scalars(scalars);
    transcript.challenge_scalar()
}

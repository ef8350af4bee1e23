use ark_ff::{BigInteger, PrimeField};
use sha3::{Digest, Keccak256};

use super::Transcript;

/// Keccak256 chain: every absorb replaces the state with
/// `keccak(state || round || data)`.
#[derive(Clone)]
pub struct KeccakTranscript {
    state: [u8; 32],
    round: u32,
    #[cfg(test)]
    history: Vec<[u8; 32]>,
}

impl KeccakTranscript {
    /// Left-aligns short messages in a 32-byte word; longer ones are hashed down.
    fn word(bytes: &[u8]) -> [u8; 32] {
        if bytes.len() > 32 {
            return Keccak256::digest(bytes).into();
        }
        let mut word = [0u8; 32];
        word[..bytes.len()].copy_from_slice(bytes);
        word
    }

    fn absorb(&mut self, chunks: &[&[u8]]) {
        let mut hasher = Keccak256::new();
        hasher.update(self.state);
        hasher.update(self.round.to_be_bytes());
        for chunk in chunks {
            hasher.update(chunk);
        }
        self.state = hasher.finalize().into();
        self.round += 1;
        #[cfg(test)]
        self.history.push(self.state);
    }

    pub fn state(&self) -> [u8; 32] {
        self.state
    }
}

impl Transcript for KeccakTranscript {
    fn new(label: &'static [u8]) -> Self {
        let state: [u8; 32] = Keccak256::digest(Self::word(label)).into();
        Self {
            state,
            round: 0,
            #[cfg(test)]
            history: vec![state],
        }
    }

    fn append_message(&mut self, msg: &'static [u8]) {
        self.absorb(&[&Self::word(msg)]);
    }

    fn append_bytes(&mut self, bytes: &[u8]) {
        self.absorb(&[bytes]);
    }

    fn append_u64(&mut self, x: u64) {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&x.to_be_bytes());
        self.absorb(&[&word]);
    }

    fn append_scalar<F: PrimeField>(&mut self, scalar: &F) {
        self.absorb(&[&scalar.into_bigint().to_bytes_be()]);
    }

    fn append_scalars<F: PrimeField>(&mut self, scalars: &[F]) {
        self.append_message(b"scalars_begin");
        for scalar in scalars {
            self.append_scalar(scalar);
        }
        self.append_message(b"scalars_end");
    }

    fn challenge_scalar<F: PrimeField>(&mut self) -> F {
        self.absorb(&[b"challenge"]);
        F::from_be_bytes_mod_order(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use ark_bn254::Fr;

    use super::*;

    fn absorb_pair(label: &'static [u8], first: u64, second: u64) -> KeccakTranscript {
        let mut transcript = KeccakTranscript::new(label);
        transcript.append_scalars(&[Fr::from(first), Fr::from(second)]);
        transcript
    }

    #[test]
    fn same_inputs_same_challenge() {
        let mut a = absorb_pair(b"test", 1, 2);
        let mut b = absorb_pair(b"test", 1, 2);
        assert_eq!(a.challenge_scalar::<Fr>(), b.challenge_scalar::<Fr>());
        assert_eq!(a.history, b.history);
    }

    #[test]
    fn order_and_label_matter() {
        let reference = absorb_pair(b"test", 1, 2).challenge_scalar::<Fr>();
        assert_ne!(absorb_pair(b"test", 2, 1).challenge_scalar::<Fr>(), reference);
        assert_ne!(absorb_pair(b"other", 1, 2).challenge_scalar::<Fr>(), reference);
    }

    #[test]
    fn every_absorb_advances_the_round() {
        let mut transcript = KeccakTranscript::new(b"rounds");
        transcript.append_u64(7);
        let first: Fr = transcript.challenge_scalar();
        let second: Fr = transcript.challenge_scalar();
        assert_ne!(first, second);
        assert_eq!(transcript.round, 3);
        assert_eq!(transcript.history.len(), 4);
        assert_eq!(transcript.history.last(), Some(&transcript.state()));
    }

    #[test]
    fn long_labels_are_hashed() {
        let long = KeccakTranscript::new(b"a label that is longer than one 32-byte word");
        let short = KeccakTranscript::new(b"a label");
        assert_ne!(long.state(), short.state());
    }
}

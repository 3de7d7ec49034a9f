//! Counter nonces for the DarkStar AEAD.
//!
//! Reusing a nonce under the same key is catastrophic, and the max value is reserved.
//! The counter only moves forward through `advance`, which refuses to step onto the
//! reserved value.

use zeroize::Zeroize;

use super::cipher_state::CipherError;

#[derive(Zeroize, Default)]
#[cfg_attr(test, derive(Debug, PartialEq, Eq))]
pub(crate) struct Nonce(u64);

impl Nonce {
    pub(crate) fn new() -> Self {
        Self(0)
    }

    /// The 96-bit chacha nonce for the current counter: 4 zero bytes, then the counter
    /// little-endian.
    pub(crate) fn chacha_bytes(&self) -> Result<[u8; 12], CipherError> {
        if self.0 == u64::MAX {
            return Err(CipherError::NonceExhausted);
        }
        let mut nonce = [0; 12];
        nonce[4..].copy_from_slice(&self.0.to_le_bytes());
        Ok(nonce)
    }

    /// Moves to the next counter. Only call after the current nonce was used successfully.
    pub(crate) fn advance(&mut self) {
        self.0 = self.0.saturating_add(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basic_inc() {
        let mut nonce = Nonce::new();
        assert_eq!([0; 12], nonce.chacha_bytes().unwrap());
        nonce.advance();

        let ref_arr = [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(ref_arr, nonce.chacha_bytes().unwrap());
        nonce.advance();

        let ref_arr = [0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(ref_arr, nonce.chacha_bytes().unwrap());
        assert_eq!(Nonce(2), nonce);
    }

    #[test]
    fn final_inc() {
        let mut nonce = Nonce(u64::MAX - 1);
        let ref_arr = [0, 0, 0, 0, 254, 255, 255, 255, 255, 255, 255, 255];
        assert_eq!(ref_arr, nonce.chacha_bytes().unwrap());
        nonce.advance();
        assert!(matches!(
            nonce.chacha_bytes(),
            Err(CipherError::NonceExhausted)
        ));
    }

    #[test]
    fn le_construction() {
        let ref_array = [44, 46, 42, 89, 12, 19, 13, 121];
        let nonce = Nonce(u64::from_le_bytes(ref_array));
        let n = nonce.chacha_bytes().unwrap();
        assert_eq!(n[4..], ref_array);
        assert_eq!(n[..4], [0; 4]);
    }

    #[test]
    fn reserved_max_is_refused() {
        let mut nonce = Nonce(u64::MAX);
        assert!(nonce.chacha_bytes().is_err());
        nonce.advance();
        assert!(nonce.chacha_bytes().is_err());
    }
}

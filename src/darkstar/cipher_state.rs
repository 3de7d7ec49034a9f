//! just using chacha20poly1305 for now.
use chacha20poly1305::{
    aead::{generic_array::GenericArray, AeadInPlace},
    ChaCha20Poly1305, KeyInit,
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::nonce::Nonce;

pub(crate) const KEY_LEN: usize = 32;
pub(crate) const TAG_LEN: usize = 16;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    #[error("decryption failed: ciphertext is not authentic")]
    Decrypt,
    #[error("encryption failed")]
    Encrypt,
    #[error("nonce space exhausted")]
    NonceExhausted,
    #[error("refusing to use an all-zero key")]
    EmptyKey,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct CipherKey([u8; KEY_LEN]);

impl CipherKey {
    fn valid_key(&self) -> bool {
        self.0.iter().any(|&b| b != 0)
    }
}

/// One key and its running nonce. During the handshake there is at most one; once the
/// handshake splits, each direction of a stream owns its own.
pub(crate) struct CipherState {
    nonce: Nonce,
    key: CipherKey,
}

impl CipherState {
    pub(crate) fn init(new_key: [u8; KEY_LEN]) -> Result<Self, CipherError> {
        let key = CipherKey(new_key);
        if !key.valid_key() {
            return Err(CipherError::EmptyKey);
        }
        Ok(Self {
            nonce: Nonce::new(),
            key,
        })
    }

    /// Refreshes the cipher state with a new key, setting nonce to 0.
    pub(crate) fn reset_key(&mut self, new_key: [u8; KEY_LEN]) -> Result<(), CipherError> {
        *self = Self::init(new_key)?;
        Ok(())
    }

    /// Seals `text` in place, appending the tag. The nonce only advances on success.
    pub(crate) fn encrypt_with_ad(
        &mut self,
        associated_data: &[u8],
        text: &mut Vec<u8>,
    ) -> Result<(), CipherError> {
        let nonce = self.nonce.chacha_bytes()?;
        let aead = ChaCha20Poly1305::new(GenericArray::from_slice(&self.key.0));
        aead.encrypt_in_place(GenericArray::from_slice(&nonce), associated_data, text)
            .map_err(|_| CipherError::Encrypt)?;
        self.nonce.advance();
        Ok(())
    }

    /// Opens `text` (ciphertext plus trailing tag) in place. A failed open leaves the nonce
    /// where it was, so the state is still usable for the sender's next message.
    pub(crate) fn decrypt_with_ad(
        &mut self,
        associated_data: &[u8],
        text: &mut Vec<u8>,
    ) -> Result<(), CipherError> {
        if text.len() < TAG_LEN {
            return Err(CipherError::Decrypt);
        }
        let nonce = self.nonce.chacha_bytes()?;
        let aead = ChaCha20Poly1305::new(GenericArray::from_slice(&self.key.0));
        aead.decrypt_in_place(GenericArray::from_slice(&nonce), associated_data, text)
            .map_err(|_| CipherError::Decrypt)?;
        self.nonce.advance();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn good_init() {
        let state = CipherState::init([1; 32]).unwrap();
        assert_eq!(state.nonce, Nonce::new());
    }

    #[test]
    fn good_reset() {
        let mut state = CipherState::init([1; 32]).unwrap();
        state.encrypt_with_ad(&[], &mut b"abc".to_vec()).unwrap();
        state.reset_key([2; 32]).unwrap();
        assert_eq!(state.nonce, Nonce::new());
    }

    #[test]
    fn bad_init() {
        assert!(matches!(
            CipherState::init([0; 32]),
            Err(CipherError::EmptyKey)
        ));
    }

    #[test]
    fn bad_reset() {
        let mut state = CipherState::init([1; 32]).unwrap();
        assert_eq!(state.reset_key([0; 32]), Err(CipherError::EmptyKey));
    }

    #[test]
    fn encryption_round_trip() {
        let start_text = b"without using any actual techniques that you would use when we give you the job, please do <thing that you really should just use a library for>";

        let mut sender = CipherState::init(*b"fizzbuzz000000000000000000000000").unwrap();
        let mut receiver = CipherState::init(*b"fizzbuzz000000000000000000000000").unwrap();
        let ad = b"foobar00000000000000000000000000";

        let mut text = start_text.to_vec();
        sender.encrypt_with_ad(ad, &mut text).unwrap();
        assert_eq!(text.len(), start_text.len() + TAG_LEN);
        assert_eq!(sender.nonce.chacha_bytes().unwrap()[4], 1);

        receiver.decrypt_with_ad(ad, &mut text).unwrap();
        assert_eq!(receiver.nonce.chacha_bytes().unwrap()[4], 1);
        assert_eq!(text.as_slice(), start_text);
    }

    #[test]
    fn tampered_text_keeps_nonce() {
        let mut sender = CipherState::init([7; 32]).unwrap();
        let mut receiver = CipherState::init([7; 32]).unwrap();

        let mut text = b"hello".to_vec();
        sender.encrypt_with_ad(&[], &mut text).unwrap();
        let good = text.clone();
        text[0] ^= 0x80;

        assert_eq!(
            receiver.decrypt_with_ad(&[], &mut text),
            Err(CipherError::Decrypt)
        );
        assert_eq!(receiver.nonce, Nonce::new());

        let mut text = good;
        receiver.decrypt_with_ad(&[], &mut text).unwrap();
        assert_eq!(text, b"hello");
    }
}

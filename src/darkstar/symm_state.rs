use blake2::{
    digest::{generic_array::GenericArray, FixedOutput, Mac, Update},
    Blake2s256, Blake2sMac256, Digest,
};
use zeroize::Zeroize;

use super::cipher_state::{CipherError, CipherState, KEY_LEN};

/// BLAKE2s output length, which is also the chaining key and handshake hash length.
pub(crate) const HASH_LEN: usize = 32;

type Hash = [u8; HASH_LEN];

/// Chaining key, handshake hash and (once keyed) a cipher state. Each party's sole
/// symmetric state encapsulates the symmetric cryptography of the handshake and is
/// consumed by `split` once the handshake is complete.
pub(crate) struct SymmState {
    cipher_state: Option<CipherState>,
    chaining_key: Hash,
    output_hash: Hash,
}

impl SymmState {
    pub(crate) fn init(proto_name: &[u8]) -> Self {
        let init_state: Hash = if proto_name.len() > HASH_LEN {
            Blake2s256::new().chain_update(proto_name).finalize().into()
        } else {
            let mut init_state = [0; HASH_LEN];
            init_state[0..proto_name.len()].copy_from_slice(proto_name);
            init_state
        };

        Self {
            cipher_state: None,
            chaining_key: init_state,
            output_hash: init_state,
        }
    }

    #[cfg(test)]
    pub(crate) fn handshake_hash(&self) -> &[u8] {
        &self.output_hash
    }

    pub(crate) fn mix_hash(&mut self, data: &[u8]) {
        self.output_hash = Blake2s256::new()
            .chain_update(self.output_hash)
            .chain_update(data)
            .finalize()
            .into();
    }

    pub(crate) fn mix_key(&mut self, input: &[u8]) -> Result<(), CipherError> {
        let (mut new_key, mut temp_key) = hkdf2(&self.chaining_key, input);
        let keyed = self.rekey(temp_key);
        self.chaining_key = new_key;
        new_key.zeroize();
        temp_key.zeroize();
        keyed
    }

    /// Mixes a pre-shared key into both the chaining key and the handshake hash.
    pub(crate) fn mix_key_and_hash(&mut self, input: &[u8]) -> Result<(), CipherError> {
        let (mut new_key, mut temp_hash, mut temp_key) = hkdf3(&self.chaining_key, input);
        self.chaining_key = new_key;
        self.mix_hash(&temp_hash);
        let keyed = self.rekey(temp_key);
        new_key.zeroize();
        temp_hash.zeroize();
        temp_key.zeroize();
        keyed
    }

    fn rekey(&mut self, key: [u8; KEY_LEN]) -> Result<(), CipherError> {
        match &mut self.cipher_state {
            Some(state) => state.reset_key(key),
            None => {
                self.cipher_state = Some(CipherState::init(key)?);
                Ok(())
            }
        }
    }

    /// Seals `text` under the current handshake hash and mixes the ciphertext back in.
    pub(crate) fn encrypt_and_hash(&mut self, text: &mut Vec<u8>) -> Result<(), CipherError> {
        let Some(state) = self.cipher_state.as_mut() else {
            // Not keyed yet: the payload travels in the clear.
            self.mix_hash(text);
            return Ok(());
        };
        state.encrypt_with_ad(&self.output_hash, text)?;
        self.mix_hash(text);
        Ok(())
    }

    pub(crate) fn decrypt_and_hash(&mut self, text: &mut Vec<u8>) -> Result<(), CipherError> {
        let Some(state) = self.cipher_state.as_mut() else {
            self.mix_hash(text);
            return Ok(());
        };
        let next_hash: Hash = Blake2s256::new()
            .chain_update(self.output_hash)
            .chain_update(&text[..])
            .finalize()
            .into();
        state.decrypt_with_ad(&self.output_hash, text)?;
        self.output_hash = next_hash;
        Ok(())
    }

    /// Consumes the state, yielding the (initiator-to-responder, responder-to-initiator)
    /// transport keys.
    pub(crate) fn split(mut self) -> Result<(CipherState, CipherState), CipherError> {
        let (mut first, mut second) = hkdf2(&self.chaining_key, &[]);
        let pair = (CipherState::init(first), CipherState::init(second));
        first.zeroize();
        second.zeroize();
        self.chaining_key.zeroize();
        Ok((pair.0?, pair.1?))
    }
}

fn keyed_mac(key: &[u8; HASH_LEN], parts: &[&[u8]]) -> Hash {
    let mut mac = <Blake2sMac256 as Mac>::new(GenericArray::from_slice(key));
    for part in parts {
        Update::update(&mut mac, part);
    }
    mac.finalize_fixed().into()
}

fn hkdf2(chained: &Hash, input: &[u8]) -> (Hash, [u8; KEY_LEN]) {
    let mut tmp = keyed_mac(chained, &[input]);
    let out1 = keyed_mac(&tmp, &[&[1]]);
    let out2 = keyed_mac(&tmp, &[&out1, &[2]]);
    tmp.zeroize();
    (out1, out2)
}

fn hkdf3(chained: &Hash, input: &[u8]) -> (Hash, Hash, [u8; KEY_LEN]) {
    let mut tmp = keyed_mac(chained, &[input]);
    let out1 = keyed_mac(&tmp, &[&[1]]);
    let out2 = keyed_mac(&tmp, &[&out1, &[2]]);
    let out3 = keyed_mac(&tmp, &[&out2, &[3]]);
    tmp.zeroize();
    (out1, out2, out3)
}

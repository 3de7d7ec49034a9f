//! DarkStar: Noise-style handshakes over X25519, ChaCha20-Poly1305 and BLAKE2s.
//!
//! An asymmetric credential runs the NK pattern (the client knows the server's static
//! public key), a password runs NNpsk0. Either way the server's configured host and port
//! go into the prologue, so both ends must agree on the server's identity.

/// One each during handshake. During transport, each direction has its own.
mod cipher_state;
/// Contains a symmetric state, plus the diffie-hellman variables.
mod hs_state;
mod nonce;
mod stream;
/// Chaining key and handshake hash. Deleted once the handshake is complete.
mod symm_state;

use async_trait::async_trait;
use blake2::{Blake2s256, Digest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use x25519_dalek::{PublicKey, ReusableSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub use cipher_state::CipherError;
pub use stream::{DarkStarStream, MAX_PAYLOAD_LEN};

use crate::address::ResolvedAddress;
use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::handshake::{Handshake, HandshakeError, HandshakeProvider, Role};
use crate::stream::{AsyncStream, EncryptedStream};
use hs_state::{HsState, Keys, Pattern};

const PROLOGUE_TAG: &[u8] = b"darkstar";
const PSK_CONTEXT: &[u8] = b"darkstar psk";

/// The DarkStar handshake provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct DarkStar;

impl HandshakeProvider for DarkStar {
    fn name(&self) -> &'static str {
        crate::registry::DARKSTAR
    }

    fn initiator(
        &self,
        credential: &Credential,
        identity: &ResolvedAddress,
    ) -> Result<Box<dyn Handshake>> {
        let (pattern, keys) = match credential {
            Credential::SymmetricPassword(password) => {
                (Pattern::NNpsk0, Keys::PreShared(psk_from_password(password)?))
            }
            Credential::AsymmetricKey(server_public) => (
                Pattern::NK,
                Keys::RemoteStatic(server_public_key(server_public)?),
            ),
        };
        DarkStarHandshake::start(pattern, Role::Initiator, identity, keys)
    }

    fn responder(
        &self,
        credential: &Credential,
        identity: &ResolvedAddress,
    ) -> Result<Box<dyn Handshake>> {
        let (pattern, keys) = match credential {
            Credential::SymmetricPassword(password) => {
                (Pattern::NNpsk0, Keys::PreShared(psk_from_password(password)?))
            }
            Credential::AsymmetricKey(server_private) => (
                Pattern::NK,
                Keys::LocalStatic(StaticSecret::from(*decode_key(server_private)?)),
            ),
        };
        DarkStarHandshake::start(pattern, Role::Responder, identity, keys)
    }
}

struct DarkStarHandshake {
    state: HsState,
}

impl DarkStarHandshake {
    fn start(
        pattern: Pattern,
        role: Role,
        identity: &ResolvedAddress,
        keys: Keys,
    ) -> Result<Box<dyn Handshake>> {
        let state = HsState::start(pattern, &prologue(identity), role, keys)?;
        Ok(Box::new(Self { state }))
    }
}

#[async_trait]
impl Handshake for DarkStarHandshake {
    async fn perform(
        self: Box<Self>,
        mut stream: Box<dyn AsyncStream>,
    ) -> std::result::Result<EncryptedStream, HandshakeError> {
        let mut state = self.state;
        while !state.is_finished() {
            if state.is_my_turn() {
                let message = state.write_message()?;
                stream.write_all(&message).await?;
                stream.flush().await?;
            } else {
                let mut message = vec![0u8; state.next_message_len()];
                stream.read_exact(&mut message).await?;
                state.read_message(&message)?;
            }
        }
        let (sender, receiver) = state.finish()?;
        Ok(Box::new(DarkStarStream::new(stream, sender, receiver)))
    }
}

/// `"darkstar" || host || port` with the port big-endian.
fn prologue(identity: &ResolvedAddress) -> Vec<u8> {
    let mut prologue = Vec::with_capacity(PROLOGUE_TAG.len() + identity.host.len() + 2);
    prologue.extend_from_slice(PROLOGUE_TAG);
    prologue.extend_from_slice(identity.host.as_bytes());
    prologue.extend_from_slice(&identity.port.to_be_bytes());
    prologue
}

fn psk_from_password(password: &str) -> Result<Zeroizing<[u8; 32]>> {
    if password.is_empty() {
        return Err(Error::InvalidCredential("password is empty".into()));
    }
    let mut psk = Zeroizing::new([0u8; 32]);
    let digest = Blake2s256::new()
        .chain_update(PSK_CONTEXT)
        .chain_update(password.as_bytes())
        .finalize();
    psk.copy_from_slice(&digest);
    Ok(psk)
}

/// Decodes a server public key, refusing low-order points that would make `es`
/// independent of the server's secret.
fn server_public_key(hex_key: &str) -> Result<PublicKey> {
    let public = PublicKey::from(*decode_key(hex_key)?);
    if !ReusableSecret::random().diffie_hellman(&public).was_contributory() {
        return Err(Error::InvalidCredential(
            "server public key is a low-order point".into(),
        ));
    }
    Ok(public)
}

fn decode_key(hex_key: &str) -> Result<Zeroizing<[u8; 32]>> {
    let mut key = Zeroizing::new([0u8; 32]);
    hex::decode_to_slice(hex_key.trim(), &mut key[..]).map_err(|e| {
        Error::InvalidCredential(format!("expected a 32-byte hex encoded key: {}", e))
    })?;
    Ok(key)
}

/// A hex-encoded X25519 key pair. The private key belongs in the server config, the
/// public key in every client config.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

pub fn generate_keypair() -> KeyPair {
    let secret = StaticSecret::random();
    let public = PublicKey::from(&secret);
    let private_bytes = Zeroizing::new(secret.to_bytes());
    KeyPair {
        private_key: hex::encode(&private_bytes[..]),
        public_key: hex::encode(public.as_bytes()),
    }
}

/// Derives the hex public key clients need from a server's hex private key.
pub fn public_key_for(private_key: &str) -> Result<String> {
    let secret = StaticSecret::from(*decode_key(private_key)?);
    Ok(hex::encode(PublicKey::from(&secret).as_bytes()))
}

#[cfg(test)]
mod test {
    use tokio::io::duplex;

    use super::*;

    fn identity() -> ResolvedAddress {
        ResolvedAddress::new("127.0.0.1", 1236)
    }

    async fn handshake_pair(
        client: &Credential,
        server: &Credential,
    ) -> (
        std::result::Result<EncryptedStream, HandshakeError>,
        std::result::Result<EncryptedStream, HandshakeError>,
    ) {
        let (left, right) = duplex(4096);
        let initiator = DarkStar.initiator(client, &identity()).unwrap();
        let responder = DarkStar.responder(server, &identity()).unwrap();
        let server = tokio::spawn(async move { responder.perform(Box::new(right)).await });
        let client = initiator.perform(Box::new(left)).await;
        (client, server.await.unwrap())
    }

    #[tokio::test]
    async fn key_pair_handshake() {
        let pair = generate_keypair();
        let (client, server) = handshake_pair(
            &Credential::key(pair.public_key.clone()),
            &Credential::key(pair.private_key.clone()),
        )
        .await;
        let mut client = client.unwrap();
        let mut server = server.unwrap();

        client.write_all(b"test").await.unwrap();
        client.flush().await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"test");
    }

    #[tokio::test]
    async fn password_handshake() {
        let (client, server) = handshake_pair(
            &Credential::password("1234"),
            &Credential::password("1234"),
        )
        .await;
        assert!(client.is_ok());
        assert!(server.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_fails_both_sides() {
        let (client, server) = handshake_pair(
            &Credential::password("1234"),
            &Credential::password("4321"),
        )
        .await;
        assert!(matches!(server, Err(HandshakeError::Authentication)));
        assert!(matches!(client, Err(HandshakeError::Io(_))));
    }

    #[test]
    fn public_key_matches_generated() {
        let pair = generate_keypair();
        assert_eq!(public_key_for(&pair.private_key).unwrap(), pair.public_key);
        assert_eq!(pair.public_key.len(), 64);
    }

    #[test]
    fn bad_keys_are_invalid_credentials() {
        let too_long = "ab".repeat(33);
        for bad in ["", "zz", "00ff", too_long.as_str()] {
            assert!(matches!(
                DarkStar.initiator(&Credential::key(bad), &identity()),
                Err(Error::InvalidCredential(_))
            ));
        }
        assert!(matches!(
            DarkStar.responder(&Credential::password(""), &identity()),
            Err(Error::InvalidCredential(_))
        ));
    }

    #[test]
    fn low_order_server_key_is_invalid_credential() {
        let mut one = [0u8; 32];
        one[0] = 1;
        for low_order in [[0u8; 32], one] {
            let credential = Credential::key(hex::encode(low_order));
            assert!(matches!(
                DarkStar.validate(&credential, Role::Initiator, &identity()),
                Err(Error::InvalidCredential(_))
            ));
        }
    }

    #[test]
    fn validate_checks_role() {
        let pair = generate_keypair();
        let credential = Credential::key(pair.public_key.clone());
        assert!(DarkStar
            .validate(&credential, Role::Initiator, &identity())
            .is_ok());
        assert!(DarkStar
            .validate(&Credential::key("nothex"), Role::Responder, &identity())
            .is_err());
    }

    #[test]
    fn prologue_layout() {
        assert_eq!(prologue(&identity()), b"darkstar127.0.0.1\x04\xd4".to_vec());
    }
}

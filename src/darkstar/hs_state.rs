use x25519_dalek::{PublicKey, ReusableSecret, SharedSecret, StaticSecret};
use zeroize::Zeroizing;

use super::cipher_state::{CipherState, TAG_LEN};
use super::symm_state::SymmState;
use crate::handshake::{HandshakeError, Role};

/// using x25519-dalek
pub(crate) const DH_LEN: usize = 32;

/// Handshake patterns DarkStar speaks.
///
/// # First character
/// N: **N**o static key for initiator
///
/// # Second character
/// N: **N**o static key for responder
/// K: Static key for responder **K**nown to initiator
///
/// A `psk0` suffix mixes a pre-shared key in before the first message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pattern {
    NK,
    NNpsk0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    E,
    Es,
    Ee,
    Psk,
}

impl Pattern {
    fn proto_name(&self) -> &'static [u8] {
        match self {
            Pattern::NK => b"Noise_NK_25519_ChaChaPoly_BLAKE2s",
            Pattern::NNpsk0 => b"Noise_NNpsk0_25519_ChaChaPoly_BLAKE2s",
        }
    }

    fn make_sequence(&self) -> &'static [&'static [Token]] {
        match self {
            Pattern::NK => &[&[Token::E, Token::Es], &[Token::E, Token::Ee]],
            Pattern::NNpsk0 => &[&[Token::Psk, Token::E], &[Token::E, Token::Ee]],
        }
    }

    fn has_psk(&self) -> bool {
        matches!(self, Pattern::NNpsk0)
    }
}

/// Key material a party brings to the handshake.
pub(crate) enum Keys {
    /// Initiator side of NK: the responder's static public key.
    RemoteStatic(PublicKey),
    /// Responder side of NK: its own static secret.
    LocalStatic(StaticSecret),
    /// Either side of NNpsk0.
    PreShared(Zeroizing<[u8; 32]>),
}

/// A symmetric state plus the diffie-hellman variables. Consumed by `finish` once the
/// handshake is complete.
pub(crate) struct HsState {
    role: Role,
    pattern: Pattern,
    symm_state: SymmState,
    keys: Keys,
    my_secret: ReusableSecret,
    other_pub: Option<PublicKey>,
    message_index: usize,
}

impl HsState {
    pub(crate) fn start(
        pattern: Pattern,
        prologue: &[u8],
        role: Role,
        keys: Keys,
    ) -> Result<Self, HandshakeError> {
        let mut symm_state = SymmState::init(pattern.proto_name());
        symm_state.mix_hash(prologue);

        match (&pattern, &keys) {
            (Pattern::NK, Keys::RemoteStatic(rs)) => symm_state.mix_hash(rs.as_bytes()),
            (Pattern::NK, Keys::LocalStatic(s)) => {
                symm_state.mix_hash(PublicKey::from(s).as_bytes())
            }
            (Pattern::NNpsk0, Keys::PreShared(_)) => {}
            _ => {
                return Err(HandshakeError::UnsupportedCredential(
                    "key material does not match the handshake pattern",
                ))
            }
        }

        Ok(Self {
            role,
            pattern,
            symm_state,
            keys,
            my_secret: ReusableSecret::random(),
            other_pub: None,
            message_index: 0,
        })
    }

    /// True when the next message is ours to write.
    pub(crate) fn is_my_turn(&self) -> bool {
        let initiator_turn = self.message_index % 2 == 0;
        initiator_turn == (self.role == Role::Initiator)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.message_index >= self.pattern.make_sequence().len()
    }

    /// Wire length of the next message. Every DarkStar message carries an empty sealed
    /// payload, so it is the ephemeral keys plus one tag.
    pub(crate) fn next_message_len(&self) -> usize {
        let keys = self.current_tokens().iter().filter(|&&t| t == Token::E).count();
        keys * DH_LEN + TAG_LEN
    }

    fn current_tokens(&self) -> &'static [Token] {
        self.pattern
            .make_sequence()
            .get(self.message_index)
            .copied()
            .unwrap_or(&[])
    }

    pub(crate) fn write_message(&mut self) -> Result<Vec<u8>, HandshakeError> {
        let mut buff = Vec::with_capacity(self.next_message_len());
        for &token in self.current_tokens() {
            match token {
                Token::E => {
                    let my_pub = PublicKey::from(&self.my_secret);
                    self.mix_e(&my_pub)?;
                    buff.extend_from_slice(my_pub.as_bytes());
                }
                other => self.mix_token(other)?,
            }
        }
        let mut payload = Vec::with_capacity(TAG_LEN);
        self.symm_state.encrypt_and_hash(&mut payload)?;
        buff.extend_from_slice(&payload);
        self.message_index += 1;
        Ok(buff)
    }

    pub(crate) fn read_message(&mut self, message: &[u8]) -> Result<(), HandshakeError> {
        let expected = self.next_message_len();
        if message.len() != expected {
            return Err(HandshakeError::MalformedMessage {
                expected,
                actual: message.len(),
            });
        }

        let mut rest = message;
        for &token in self.current_tokens() {
            match token {
                Token::E => {
                    let (key, tail) = rest.split_at(DH_LEN);
                    let mut re = [0u8; DH_LEN];
                    re.copy_from_slice(key);
                    let re = PublicKey::from(re);
                    self.mix_e(&re)?;
                    self.other_pub = Some(re);
                    rest = tail;
                }
                other => self.mix_token(other)?,
            }
        }
        let mut payload = rest.to_vec();
        self.symm_state
            .decrypt_and_hash(&mut payload)
            .map_err(|_| HandshakeError::Authentication)?;
        self.message_index += 1;
        Ok(())
    }

    /// Splits into (sender, receiver) transport states for this party.
    pub(crate) fn finish(self) -> Result<(CipherState, CipherState), HandshakeError> {
        if !self.is_finished() {
            return Err(HandshakeError::Incomplete);
        }
        let (initiator_to_responder, responder_to_initiator) = self.symm_state.split()?;
        Ok(match self.role {
            Role::Initiator => (initiator_to_responder, responder_to_initiator),
            Role::Responder => (responder_to_initiator, initiator_to_responder),
        })
    }

    fn mix_e(&mut self, e: &PublicKey) -> Result<(), HandshakeError> {
        self.symm_state.mix_hash(e.as_bytes());
        if self.pattern.has_psk() {
            self.symm_state.mix_key(e.as_bytes())?;
        }
        Ok(())
    }

    fn mix_token(&mut self, token: Token) -> Result<(), HandshakeError> {
        let shared = match (token, self.role, &self.keys) {
            (Token::Psk, _, Keys::PreShared(psk)) => {
                self.symm_state.mix_key_and_hash(&psk[..])?;
                return Ok(());
            }
            (Token::Es, Role::Initiator, Keys::RemoteStatic(rs)) => {
                self.my_secret.diffie_hellman(rs)
            }
            (Token::Es, Role::Responder, Keys::LocalStatic(s)) => {
                s.diffie_hellman(self.remote_ephemeral()?)
            }
            (Token::Ee, _, _) => self.my_secret.diffie_hellman(self.remote_ephemeral()?),
            _ => {
                return Err(HandshakeError::UnsupportedCredential(
                    "key material does not match the handshake pattern",
                ))
            }
        };
        self.mix_shared(shared)
    }

    fn mix_shared(&mut self, shared: SharedSecret) -> Result<(), HandshakeError> {
        if !shared.was_contributory() {
            return Err(HandshakeError::NonContributory);
        }
        self.symm_state.mix_key(shared.as_bytes())?;
        Ok(())
    }

    fn remote_ephemeral(&self) -> Result<&PublicKey, HandshakeError> {
        self.other_pub.as_ref().ok_or(HandshakeError::Incomplete)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PROLOGUE: &[u8] = b"darkstar127.0.0.1\x04\xd4";

    fn run(
        mut initer: HsState,
        mut resper: HsState,
    ) -> Result<((CipherState, CipherState), (CipherState, CipherState)), HandshakeError> {
        while !initer.is_finished() {
            let (writer, reader) = if initer.is_my_turn() {
                (&mut initer, &mut resper)
            } else {
                (&mut resper, &mut initer)
            };
            let message = writer.write_message()?;
            reader.read_message(&message)?;
        }
        Ok((initer.finish()?, resper.finish()?))
    }

    fn nk_pair(server: &StaticSecret, known: PublicKey) -> (HsState, HsState) {
        let initer = HsState::start(
            Pattern::NK,
            PROLOGUE,
            Role::Initiator,
            Keys::RemoteStatic(known),
        )
        .unwrap();
        let resper = HsState::start(
            Pattern::NK,
            PROLOGUE,
            Role::Responder,
            Keys::LocalStatic(server.clone()),
        )
        .unwrap();
        (initer, resper)
    }

    #[test]
    fn nk_handshake_agrees() {
        let server = StaticSecret::random();
        let (initer, resper) = nk_pair(&server, PublicKey::from(&server));
        assert_eq!(initer.next_message_len(), DH_LEN + TAG_LEN);
        assert!(initer.is_my_turn());
        assert!(!resper.is_my_turn());

        let ((mut i_send, mut i_recv), (mut r_send, mut r_recv)) =
            run(initer, resper).unwrap();

        let mut text = b"test".to_vec();
        i_send.encrypt_with_ad(&[], &mut text).unwrap();
        r_recv.decrypt_with_ad(&[], &mut text).unwrap();
        assert_eq!(text, b"test");

        let mut text = b"tset".to_vec();
        r_send.encrypt_with_ad(&[], &mut text).unwrap();
        i_recv.decrypt_with_ad(&[], &mut text).unwrap();
        assert_eq!(text, b"tset");
    }

    #[test]
    fn nk_wrong_server_key_fails_first_message() {
        let server = StaticSecret::random();
        let imposter = StaticSecret::random();
        let (mut initer, mut resper) = nk_pair(&server, PublicKey::from(&imposter));

        let message = initer.write_message().unwrap();
        assert!(matches!(
            resper.read_message(&message),
            Err(HandshakeError::Authentication)
        ));
    }

    #[test]
    fn prologue_mismatch_fails() {
        let server = StaticSecret::random();
        let mut initer = HsState::start(
            Pattern::NK,
            b"darkstar10.0.0.1\x04\xd4",
            Role::Initiator,
            Keys::RemoteStatic(PublicKey::from(&server)),
        )
        .unwrap();
        let mut resper =
            HsState::start(Pattern::NK, PROLOGUE, Role::Responder, Keys::LocalStatic(server))
                .unwrap();

        let message = initer.write_message().unwrap();
        assert!(resper.read_message(&message).is_err());
    }

    #[test]
    fn psk_handshake_agrees_and_rejects() {
        let start = |role, psk: [u8; 32]| {
            HsState::start(
                Pattern::NNpsk0,
                PROLOGUE,
                role,
                Keys::PreShared(Zeroizing::new(psk)),
            )
            .unwrap()
        };

        let good = run(start(Role::Initiator, [5; 32]), start(Role::Responder, [5; 32]));
        assert!(good.is_ok());

        let bad = run(start(Role::Initiator, [5; 32]), start(Role::Responder, [6; 32]));
        assert!(matches!(bad, Err(HandshakeError::Authentication)));
    }

    #[test]
    fn truncated_message_is_malformed() {
        let server = StaticSecret::random();
        let (mut initer, mut resper) = nk_pair(&server, PublicKey::from(&server));
        let message = initer.write_message().unwrap();
        assert!(matches!(
            resper.read_message(&message[..20]),
            Err(HandshakeError::MalformedMessage {
                expected: 48,
                actual: 20
            })
        ));
    }

    #[test]
    fn low_order_ephemeral_is_rejected() {
        let server = StaticSecret::random();
        let (_, mut resper) = nk_pair(&server, PublicKey::from(&server));
        let message = vec![0u8; DH_LEN + TAG_LEN];
        assert!(matches!(
            resper.read_message(&message),
            Err(HandshakeError::NonContributory)
        ));
    }

    #[test]
    fn mismatched_keys_for_pattern() {
        let res = HsState::start(
            Pattern::NNpsk0,
            PROLOGUE,
            Role::Initiator,
            Keys::RemoteStatic(PublicKey::from([9; 32])),
        );
        assert!(matches!(res, Err(HandshakeError::UnsupportedCredential(_))));
    }

    #[test]
    fn finish_before_done_is_incomplete() {
        let server = StaticSecret::random();
        let (initer, _) = nk_pair(&server, PublicKey::from(&server));
        assert!(matches!(initer.finish(), Err(HandshakeError::Incomplete)));
    }
}

//! The handshake capability consumed by the dial and accept paths.
//!
//! A [`HandshakeProvider`] is looked up by cipher name in the
//! [`CipherRegistry`](crate::registry::CipherRegistry). For every connection it builds a
//! one-shot [`Handshake`] for the local role, which then runs over the raw (or decorated)
//! stream and hands back the encrypted stream.

use std::io;

use async_trait::async_trait;
use thiserror::Error;

use crate::address::ResolvedAddress;
use crate::credential::Credential;
use crate::darkstar::CipherError;
use crate::stream::{AsyncStream, EncryptedStream};

/// Which side of the handshake this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The dialing client.
    Initiator,
    /// The accepting server.
    Responder,
}

impl Role {
    /// Tag the connection-logging decorator files its records under.
    pub fn log_tag(&self) -> &'static str {
        match self {
            Role::Initiator => "ShadowClient",
            Role::Responder => "ShadowServer",
        }
    }
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("peer failed authentication")]
    Authentication,

    #[error("key exchange produced a non-contributory shared secret")]
    NonContributory,

    #[error("credential not usable by this handshake: {0}")]
    UnsupportedCredential(&'static str),

    #[error("malformed handshake message: expected {expected} bytes, got {actual}")]
    MalformedMessage { expected: usize, actual: usize },

    #[error("handshake ended before every message was exchanged")]
    Incomplete,

    #[error("cipher failure: {0}")]
    Cipher(#[from] CipherError),

    #[error("I/O error during handshake: {0}")]
    Io(#[from] io::Error),
}

/// One party's side of a single handshake.
#[async_trait]
pub trait Handshake: Send {
    /// Drives the handshake to completion over `stream`. Nothing is returned on failure;
    /// the stream is dropped with the error.
    async fn perform(
        self: Box<Self>,
        stream: Box<dyn AsyncStream>,
    ) -> Result<EncryptedStream, HandshakeError>;
}

/// Builds handshakes for a single cipher.
///
/// `identity` is the server's host and port as configured, on both sides. Providers may
/// bind it into the handshake transcript.
pub trait HandshakeProvider: Send + Sync {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    fn initiator(
        &self,
        credential: &Credential,
        identity: &ResolvedAddress,
    ) -> crate::Result<Box<dyn Handshake>>;

    fn responder(
        &self,
        credential: &Credential,
        identity: &ResolvedAddress,
    ) -> crate::Result<Box<dyn Handshake>>;

    /// Checks the credential is usable for `role` without touching the network.
    fn validate(
        &self,
        credential: &Credential,
        role: Role,
        identity: &ResolvedAddress,
    ) -> crate::Result<()> {
        match role {
            Role::Initiator => self.initiator(credential, identity).map(drop),
            Role::Responder => self.responder(credential, identity).map(drop),
        }
    }
}

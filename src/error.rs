//! Error types for the shadow transport

use std::io;

use thiserror::Error;

use crate::handshake::HandshakeError;

/// Main error type. Every failure is returned to the immediate caller; nothing in this
/// crate retries or swallows one.
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("invalid cipher: {0}")]
    InvalidCipher(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),

    #[error("dial failed: {0}")]
    Dial(#[source] io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("connection logging failed: {0}")]
    Decorator(#[source] io::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("listener closed")]
    ListenerClosed,
}

/// Coarse classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad address, transport name, cipher name or credential. Retrying cannot help.
    Input,
    /// Bind, dial, accept or log file failure. Fatal to the call, not to the process.
    Resource,
    /// The handshake on one connection failed. Fatal to that connection only.
    Protocol,
    /// The listener was closed; an accept loop should stop.
    Lifecycle,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedAddress(_)
            | Error::UnsupportedTransport(_)
            | Error::InvalidCipher(_)
            | Error::InvalidCredential(_)
            | Error::Config(_) => ErrorKind::Input,
            Error::Bind(_) | Error::Dial(_) | Error::Accept(_) | Error::Decorator(_) => {
                ErrorKind::Resource
            }
            Error::Handshake(_) => ErrorKind::Protocol,
            Error::ListenerClosed => ErrorKind::Lifecycle,
        }
    }

    pub fn is_listener_closed(&self) -> bool {
        matches!(self, Error::ListenerClosed)
    }
}

/// Result type alias for the shadow transport
pub type Result<T> = std::result::Result<T, Error>;

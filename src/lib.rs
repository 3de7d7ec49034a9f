//! Shadow: a pluggable transport that turns a config into a ready encrypted stream.
//!
//! A [`ClientConfig`] dials, a [`ServerConfig`] listens. Both carry a `host:port`
//! address, a [`Credential`], a cipher name (only `"darkstar"` today), the transport
//! name (`"shadow"`), and an optional directory for connection logs. The handshake is
//! driven to completion before a stream is handed back.

pub mod address;
pub mod config;
pub mod credential;
/// The DarkStar handshake and its framed transport stream.
pub mod darkstar;
/// Stream wrappers interposed between the raw socket and the handshake.
pub mod decorator;
pub mod dialer;
pub mod error;
pub mod handshake;
pub mod listener;
/// Connection logging decorator.
pub mod locket;
mod pipeline;
/// Cipher-name to handshake-provider lookup.
pub mod registry;
pub mod stream;

pub use address::{resolve, ResolvedAddress};
pub use config::{ClientConfig, ServerConfig, TransportConfig, TRANSPORT_NAME};
pub use credential::Credential;
pub use darkstar::{generate_keypair, public_key_for, KeyPair};
pub use dialer::Dialer;
pub use error::{Error, ErrorKind, Result};
pub use handshake::{Handshake, HandshakeError, HandshakeProvider, Role};
pub use listener::ShadowListener;
pub use registry::{CipherRegistry, DARKSTAR};
pub use stream::{AsyncStream, EncryptedStream};

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret material handed to the handshake provider.
///
/// Exactly one shape is in effect per config. The provider reads the asymmetric key
/// according to the role: a client holds the server's public key, a server holds its own
/// private key. Both are hex-encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub enum Credential {
    /// Shared secret configured identically on both ends.
    #[serde(rename = "password")]
    SymmetricPassword(String),
    /// Server public key on a client, server private key on a server.
    #[serde(rename = "key")]
    AsymmetricKey(String),
}

impl Credential {
    pub fn password(secret: impl Into<String>) -> Self {
        Credential::SymmetricPassword(secret.into())
    }

    pub fn key(hex_key: impl Into<String>) -> Self {
        Credential::AsymmetricKey(hex_key.into())
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self, Credential::SymmetricPassword(_))
    }
}

// Never print the secret.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::SymmetricPassword(_) => f.write_str("SymmetricPassword(..)"),
            Credential::AsymmetricKey(_) => f.write_str("AsymmetricKey(..)"),
        }
    }
}

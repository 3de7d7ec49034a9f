//! Configuration bundles.
//!
//! Configs are plain data: constructing one validates nothing. The transport name, the
//! cipher name, the address and the credential are checked when `dial` or `listen` runs,
//! before any socket is opened.

use std::ops::Deref;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::dialer::Dialer;
use crate::error::{Error, Result};
use crate::listener::ShadowListener;
use crate::stream::EncryptedStream;

/// The only transport name this crate answers to.
pub const TRANSPORT_NAME: &str = "shadow";

/// Address, credential, cipher and transport names, and the optional connection log
/// directory. Usable for both dialing and listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    /// `host:port`. The server's address on both sides.
    pub address: String,
    #[serde(flatten)]
    pub credential: Credential,
    pub cipher_name: String,
    pub transport_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl TransportConfig {
    pub fn new(
        address: impl Into<String>,
        credential: Credential,
        cipher_name: impl Into<String>,
        transport_name: impl Into<String>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            address: address.into(),
            credential,
            cipher_name: cipher_name.into(),
            transport_name: transport_name.into(),
            log_dir,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn check_transport(&self) -> Result<()> {
        if self.transport_name != TRANSPORT_NAME {
            return Err(Error::UnsupportedTransport(self.transport_name.clone()));
        }
        Ok(())
    }

    pub async fn dial(&self) -> Result<EncryptedStream> {
        Dialer::new().dial(self).await
    }

    pub async fn listen(&self) -> Result<ShadowListener> {
        ShadowListener::bind(self).await
    }
}

/// Client side: `address` is the server to dial and the credential is the server's
/// public key (or the shared password).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientConfig(TransportConfig);

impl ClientConfig {
    pub fn new(
        server_address: impl Into<String>,
        credential: Credential,
        cipher_name: impl Into<String>,
        transport_name: impl Into<String>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self(TransportConfig::new(
            server_address,
            credential,
            cipher_name,
            transport_name,
            log_dir,
        ))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        TransportConfig::from_json(json).map(Self)
    }

    pub async fn dial(&self) -> Result<EncryptedStream> {
        self.0.dial().await
    }

    pub fn into_inner(self) -> TransportConfig {
        self.0
    }
}

impl Deref for ClientConfig {
    type Target = TransportConfig;

    fn deref(&self) -> &TransportConfig {
        &self.0
    }
}

impl From<TransportConfig> for ClientConfig {
    fn from(config: TransportConfig) -> Self {
        Self(config)
    }
}

/// Server side: `address` is where to listen and the credential is the server's own
/// private key (or the shared password).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerConfig(TransportConfig);

impl ServerConfig {
    pub fn new(
        server_address: impl Into<String>,
        credential: Credential,
        cipher_name: impl Into<String>,
        transport_name: impl Into<String>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self(TransportConfig::new(
            server_address,
            credential,
            cipher_name,
            transport_name,
            log_dir,
        ))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        TransportConfig::from_json(json).map(Self)
    }

    pub async fn listen(&self) -> Result<ShadowListener> {
        self.0.listen().await
    }

    pub fn into_inner(self) -> TransportConfig {
        self.0
    }
}

impl Deref for ServerConfig {
    type Target = TransportConfig;

    fn deref(&self) -> &TransportConfig {
        &self.0
    }
}

impl From<TransportConfig> for ServerConfig {
    fn from(config: TransportConfig) -> Self {
        Self(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn construction_does_not_validate() {
        let config = ClientConfig::new(
            "badaddress",
            Credential::key("not hex"),
            "rot13",
            "obfs4",
            None,
        );
        assert_eq!(config.address, "badaddress");
        assert_eq!(config.cipher_name, "rot13");
        assert_eq!(config.transport_name, "obfs4");
        assert!(matches!(
            config.check_transport(),
            Err(Error::UnsupportedTransport(ref name)) if name == "obfs4"
        ));
    }

    #[test]
    fn server_json() {
        let json = r#"{
            "address": "127.0.0.1:1236",
            "key": "dd5e9e88d13e66017eb2087b128c1009539d446208f86173e30409a898ada148",
            "cipherName": "darkstar",
            "transportName": "shadow",
            "logDir": "/var/log/shadow"
        }"#;
        let config = ServerConfig::from_json(json).unwrap();
        assert_eq!(config.address, "127.0.0.1:1236");
        assert_eq!(
            config.credential,
            Credential::key("dd5e9e88d13e66017eb2087b128c1009539d446208f86173e30409a898ada148")
        );
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/shadow")));
        assert!(config.check_transport().is_ok());
    }

    #[test]
    fn client_json_password_without_log_dir() {
        let json = r#"{"address":"127.0.0.1:1236","password":"1234","cipherName":"darkstar","transportName":"shadow"}"#;
        let config = ClientConfig::from_json(json).unwrap();
        assert!(config.credential.is_symmetric());
        assert!(config.log_dir.is_none());

        let back = ClientConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn json_without_credential_is_config_error() {
        let json = r#"{"address":"127.0.0.1:1236","cipherName":"darkstar","transportName":"shadow"}"#;
        assert!(matches!(
            TransportConfig::from_json(json),
            Err(Error::Config(_))
        ));
    }
}

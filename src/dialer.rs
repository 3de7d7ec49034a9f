use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::debug;

use crate::address::resolve;
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::handshake::Role;
use crate::pipeline::Pipeline;
use crate::registry::CipherRegistry;
use crate::stream::EncryptedStream;

/// Client-side orchestration: resolve, connect, optionally decorate, then run the
/// handshake as initiator.
#[derive(Debug, Clone, Default)]
pub struct Dialer {
    registry: Arc<CipherRegistry>,
}

impl Dialer {
    /// A dialer that knows the built-in ciphers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: Arc<CipherRegistry>) -> Self {
        Self { registry }
    }

    /// Returns only once the handshake has completed. On any failure no stream is
    /// returned and the socket, if one was opened, is closed.
    pub async fn dial(&self, config: &TransportConfig) -> Result<EncryptedStream> {
        config.check_transport()?;
        let provider = self.registry.lookup(&config.cipher_name)?;
        let identity = resolve(&config.address)?;

        let pipeline = Pipeline::new(Role::Initiator, identity, config, provider);
        let handshake = pipeline.handshake()?;

        let identity = pipeline.identity();
        debug!("dialing {}", identity);
        let stream = TcpStream::connect((identity.host.as_str(), identity.port))
            .await
            .map_err(Error::Dial)?;
        stream.set_nodelay(true).map_err(Error::Dial)?;

        pipeline.establish(Box::new(stream), handshake).await
    }
}

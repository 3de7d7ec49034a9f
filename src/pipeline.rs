//! The composition step shared by dial and accept: optional decoration, then handshake.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::address::ResolvedAddress;
use crate::config::TransportConfig;
use crate::credential::Credential;
use crate::decorator::StreamDecorator;
use crate::error::{Error, Result};
use crate::handshake::{Handshake, HandshakeProvider, Role};
use crate::locket::LocketDecorator;
use crate::stream::{AsyncStream, EncryptedStream};

pub(crate) struct Pipeline {
    role: Role,
    identity: ResolvedAddress,
    credential: Credential,
    provider: Arc<dyn HandshakeProvider>,
    decorator: Option<Arc<dyn StreamDecorator>>,
}

impl Pipeline {
    pub(crate) fn new(
        role: Role,
        identity: ResolvedAddress,
        config: &TransportConfig,
        provider: Arc<dyn HandshakeProvider>,
    ) -> Self {
        let decorator = config
            .log_dir
            .as_ref()
            .map(|dir| Arc::new(LocketDecorator::new(dir.clone())) as Arc<dyn StreamDecorator>);
        Self {
            role,
            identity,
            credential: config.credential.clone(),
            provider,
            decorator,
        }
    }

    pub(crate) fn identity(&self) -> &ResolvedAddress {
        &self.identity
    }

    /// Builds a fresh one-shot handshake for this role. Fails on an unusable credential
    /// before any bytes move.
    pub(crate) fn handshake(&self) -> Result<Box<dyn Handshake>> {
        match self.role {
            Role::Initiator => self.provider.initiator(&self.credential, &self.identity),
            Role::Responder => self.provider.responder(&self.credential, &self.identity),
        }
    }

    /// Decorates `raw` when connection logging is on, then drives `handshake` over it.
    pub(crate) async fn establish(
        &self,
        raw: Box<dyn AsyncStream>,
        handshake: Box<dyn Handshake>,
    ) -> Result<EncryptedStream> {
        let stream = match &self.decorator {
            Some(decorator) => match decorator.decorate(raw, self.role).await {
                Ok(decorated) => decorated,
                Err((e, mut raw)) => {
                    // The decorator failure is what gets reported.
                    let _ = raw.shutdown().await;
                    return Err(Error::Decorator(e));
                }
            },
            None => raw,
        };

        let encrypted = handshake.perform(stream).await?;
        debug!(
            "{} handshake with {} complete ({})",
            self.provider.name(),
            self.identity,
            self.role.log_tag()
        );
        Ok(encrypted)
    }
}

use std::io;

use async_trait::async_trait;

use crate::handshake::Role;
use crate::stream::AsyncStream;

/// Either the wrapped stream, or the error together with the untouched raw stream so the
/// caller can still shut it down.
pub type DecorateResult =
    Result<Box<dyn AsyncStream>, (io::Error, Box<dyn AsyncStream>)>;

/// Something that wraps a stream and returns a stream, fallibly.
///
/// Decorators sit between the raw socket and the handshake, so they only ever see wire
/// bytes. They must pass every byte through unchanged.
#[async_trait]
pub trait StreamDecorator: Send + Sync {
    async fn decorate(&self, stream: Box<dyn AsyncStream>, role: Role) -> DecorateResult;
}

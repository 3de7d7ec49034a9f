//! Stream abstraction shared by every layer of the pipeline.

use tokio::io::{AsyncRead, AsyncWrite};

/// A reliable, ordered, bidirectional byte stream. Raw sockets, decorated sockets and
/// encrypted streams all travel through the pipeline as `Box<dyn AsyncStream>`.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A stream that completed a handshake. Owned by whoever obtained it from `dial` or
/// `accept`; dropping it closes the connection.
pub type EncryptedStream = Box<dyn AsyncStream>;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BytesMut};
use futures::ready;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::cipher_state::{CipherError, CipherState, TAG_LEN};
use crate::stream::AsyncStream;

/// Largest plaintext carried by one frame.
pub const MAX_PAYLOAD_LEN: usize = 0x3fff;

const LEN_FIELD: usize = 2;
const SEALED_LEN_FIELD: usize = LEN_FIELD + TAG_LEN;
const MAX_FRAME_LEN: usize = SEALED_LEN_FIELD + MAX_PAYLOAD_LEN + TAG_LEN;

/// Transport phase of a DarkStar connection.
///
/// Every frame is a sealed big-endian length followed by the sealed payload, each
/// under its own nonce. The two directions use independent cipher states.
pub struct DarkStarStream {
    stream: Box<dyn AsyncStream>,
    sender: CipherState,
    receiver: CipherState,

    read_scratch: Box<[u8]>,
    unprocessed: BytesMut,
    pending_len: Option<usize>,
    processed: BytesMut,
    is_eof: bool,

    write_cache: BytesMut,
}

impl DarkStarStream {
    pub(crate) fn new(
        stream: Box<dyn AsyncStream>,
        sender: CipherState,
        receiver: CipherState,
    ) -> Self {
        Self {
            stream,
            sender,
            receiver,
            read_scratch: vec![0u8; MAX_FRAME_LEN].into_boxed_slice(),
            unprocessed: BytesMut::with_capacity(MAX_FRAME_LEN),
            pending_len: None,
            processed: BytesMut::new(),
            is_eof: false,
            write_cache: BytesMut::with_capacity(MAX_FRAME_LEN),
        }
    }

    fn seal_frame(&mut self, payload: &[u8]) -> io::Result<()> {
        let mut len_field = (payload.len() as u16).to_be_bytes().to_vec();
        self.sender
            .encrypt_with_ad(&[], &mut len_field)
            .map_err(cipher_to_io)?;

        let mut body = payload.to_vec();
        self.sender
            .encrypt_with_ad(&[], &mut body)
            .map_err(cipher_to_io)?;

        self.write_cache.extend_from_slice(&len_field);
        self.write_cache.extend_from_slice(&body);
        Ok(())
    }

    /// Opens at most one length field or payload from `unprocessed`. Returns whether any
    /// progress was made.
    fn try_open(&mut self) -> io::Result<bool> {
        match self.pending_len {
            None => {
                if self.unprocessed.len() < SEALED_LEN_FIELD {
                    return Ok(false);
                }
                let mut len_field = self.unprocessed.split_to(SEALED_LEN_FIELD).to_vec();
                self.receiver
                    .decrypt_with_ad(&[], &mut len_field)
                    .map_err(cipher_to_io)?;
                let len = u16::from_be_bytes([len_field[0], len_field[1]]) as usize;
                if len == 0 || len > MAX_PAYLOAD_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("invalid frame length {}", len),
                    ));
                }
                self.pending_len = Some(len);
                Ok(true)
            }
            Some(len) => {
                if self.unprocessed.len() < len + TAG_LEN {
                    return Ok(false);
                }
                let mut body = self.unprocessed.split_to(len + TAG_LEN).to_vec();
                self.receiver
                    .decrypt_with_ad(&[], &mut body)
                    .map_err(cipher_to_io)?;
                self.processed.extend_from_slice(&body);
                self.pending_len = None;
                Ok(true)
            }
        }
    }

    fn poll_drain_write_cache(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.write_cache.is_empty() {
            let written = ready!(Pin::new(&mut self.stream).poll_write(cx, &self.write_cache))?;
            if written == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.write_cache.advance(written);
        }
        Poll::Ready(Ok(()))
    }
}

fn cipher_to_io(err: CipherError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

impl AsyncRead for DarkStarStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.processed.is_empty() {
                let len = std::cmp::min(buf.remaining(), this.processed.len());
                buf.put_slice(&this.processed.split_to(len));
                return Poll::Ready(Ok(()));
            }

            if this.try_open()? {
                continue;
            }

            if this.is_eof {
                if this.unprocessed.is_empty() && this.pending_len.is_none() {
                    return Poll::Ready(Ok(()));
                }
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a frame",
                )));
            }

            let mut read_buf = ReadBuf::new(&mut this.read_scratch);
            ready!(Pin::new(&mut this.stream).poll_read(cx, &mut read_buf))?;
            let filled = read_buf.filled();
            if filled.is_empty() {
                this.is_eof = true;
            } else {
                this.unprocessed.extend_from_slice(filled);
            }
        }
    }
}

impl AsyncWrite for DarkStarStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        ready!(this.poll_drain_write_cache(cx))?;
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let len = std::cmp::min(buf.len(), MAX_PAYLOAD_LEN);
        this.seal_frame(&buf[..len])?;

        // The frame is accepted either way; anything left is pushed by the next write or
        // flush.
        if let Poll::Ready(Err(e)) = this.poll_drain_write_cache(cx) {
            return Poll::Ready(Err(e));
        }
        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain_write_cache(cx))?;
        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_drain_write_cache(cx))?;
        Pin::new(&mut this.stream).poll_shutdown(cx)
    }
}

//! Connection logging: a pass-through stream that records every wire byte to a file.
//!
//! One file per connection, named `<RoleTag>_<unix millis>_<sequence>.log`, inside the
//! configured directory. The directory has to exist already. Each line is
//! `<elapsed ms> <direction> <length> <hex bytes>`, where `<-` marks bytes read from the
//! peer and `->` bytes written to it.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::ready;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::decorator::{DecorateResult, StreamDecorator};
use crate::handshake::Role;
use crate::stream::AsyncStream;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

const READ_MARK: &str = "<-";
const WRITE_MARK: &str = "->";

#[derive(Debug, Clone)]
pub struct LocketDecorator {
    dir: PathBuf,
}

impl LocketDecorator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn open_log(&self, tag: &str) -> io::Result<(PathBuf, File)> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("{}_{}_{}.log", tag, millis, sequence));

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok((path, file))
    }
}

#[async_trait]
impl StreamDecorator for LocketDecorator {
    async fn decorate(&self, stream: Box<dyn AsyncStream>, role: Role) -> DecorateResult {
        let (path, file) = match self.open_log(role.log_tag()).await {
            Ok(opened) => opened,
            Err(e) => return Err((e, stream)),
        };
        trace!("logging {} connection to {}", role.log_tag(), path.display());
        let mut logged = LocketStream::new(stream, file, path);
        logged.queue(format!("# {}\n", role.log_tag()));
        Ok(Box::new(logged))
    }
}

/// Pass-through stream that appends a record of every read and write to its log file.
///
/// Records are handed to a writer task, so the stream itself never waits on the log.
/// A log failure is reported by the next call on the stream, never by the call whose
/// bytes already moved. `shutdown` waits until every record is on disk.
pub struct LocketStream {
    stream: Box<dyn AsyncStream>,
    records: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<io::Result<()>>>,
    stream_shut: bool,
    path: PathBuf,
    started: Instant,
}

impl LocketStream {
    /// Wraps `stream`, logging to `log`. Must be called inside a tokio runtime.
    pub fn new(stream: Box<dyn AsyncStream>, log: File, path: PathBuf) -> Self {
        let (records, pending) = mpsc::unbounded_channel();
        Self {
            stream,
            records: Some(records),
            writer: Some(tokio::spawn(write_records(log, pending))),
            stream_shut: false,
            path,
            started: Instant::now(),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.path
    }

    fn queue(&mut self, line: String) {
        if let Some(records) = &self.records {
            if records.send(line).is_err() {
                // Writer is gone; its error is picked up by `poll_log`.
                self.records = None;
            }
        }
    }

    fn record(&mut self, mark: &str, bytes: &[u8]) {
        let line = format!(
            "{} {} {} {}\n",
            self.started.elapsed().as_millis(),
            mark,
            bytes.len(),
            hex::encode(bytes)
        );
        self.queue(line);
    }

    /// Surfaces the writer's error once it has stopped early.
    fn poll_log(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        let stopped = self.records.as_ref().map_or(true, |r| r.is_closed());
        if !stopped {
            return Ok(());
        }
        self.records = None;
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        match Pin::new(writer).poll(cx) {
            Poll::Pending => Ok(()),
            Poll::Ready(done) => {
                self.writer = None;
                writer_result(done)
            }
        }
    }
}

fn writer_result(done: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    done.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

async fn write_records(
    file: File,
    mut pending: mpsc::UnboundedReceiver<String>,
) -> io::Result<()> {
    let mut log = BufWriter::new(file);
    while let Some(line) = pending.recv().await {
        log.write_all(line.as_bytes()).await?;
        while let Ok(line) = pending.try_recv() {
            log.write_all(line.as_bytes()).await?;
        }
        log.flush().await?;
    }
    log.flush().await
}

impl AsyncRead for LocketStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.poll_log(cx)?;
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.stream).poll_read(cx, buf))?;
        let read = &buf.filled()[before..];
        if !read.is_empty() {
            this.record(READ_MARK, read);
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for LocketStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.poll_log(cx)?;
        let written = ready!(Pin::new(&mut this.stream).poll_write(cx, buf))?;
        if written > 0 {
            this.record(WRITE_MARK, &buf[..written]);
        }
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.poll_log(cx)?;
        Pin::new(&mut this.stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.stream_shut {
            ready!(Pin::new(&mut this.stream).poll_shutdown(cx))?;
            this.stream_shut = true;
        }
        // Closing the queue lets the writer drain and finish.
        this.records = None;
        match this.writer.as_mut() {
            Some(writer) => {
                let done = ready!(Pin::new(writer).poll(cx));
                this.writer = None;
                Poll::Ready(writer_result(done))
            }
            None => Poll::Ready(Ok(())),
        }
    }
}

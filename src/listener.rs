use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::address::resolve;
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::handshake::Role;
use crate::pipeline::Pipeline;
use crate::registry::CipherRegistry;
use crate::stream::EncryptedStream;

/// Finished handshakes waiting for `accept`.
const READY_BACKLOG: usize = 32;

type Accepted = Result<EncryptedStream>;

/// Server-side orchestration around a bound TCP listener.
///
/// A background task accepts raw connections and runs each handshake on its own task,
/// as responder, against the server's own configured host and port (never the peer's).
/// `accept` hands back results in the order handshakes finish, so a peer that never
/// speaks holds up nobody. A failed handshake costs only that connection; the listener
/// keeps accepting until `close` is called.
pub struct ShadowListener {
    local_addr: SocketAddr,
    closed: watch::Sender<bool>,
    ready: tokio::sync::Mutex<mpsc::Receiver<Accepted>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl ShadowListener {
    pub async fn bind(config: &TransportConfig) -> Result<Self> {
        Self::bind_with(config, Arc::new(CipherRegistry::default())).await
    }

    pub async fn bind_with(
        config: &TransportConfig,
        registry: Arc<CipherRegistry>,
    ) -> Result<Self> {
        config.check_transport()?;
        let provider = registry.lookup(&config.cipher_name)?;
        let configured = resolve(&config.address)?;
        provider.validate(&config.credential, Role::Responder, &configured)?;

        let listener = TcpListener::bind((configured.host.as_str(), configured.port))
            .await
            .map_err(Error::Bind)?;
        let local_addr = listener.local_addr().map_err(Error::Bind)?;

        // Port 0 asks the OS for a port; the identity clients dial is the one we got.
        let identity = if configured.port == 0 {
            configured.with_port(local_addr.port())
        } else {
            configured
        };
        debug!("listening on {} as {}", local_addr, identity);

        let pipeline = Arc::new(Pipeline::new(Role::Responder, identity, config, provider));
        let (closed, closed_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = mpsc::channel(READY_BACKLOG);
        let accept_task = tokio::spawn(accept_loop(listener, pipeline, ready_tx, closed_rx));

        Ok(Self {
            local_addr,
            closed,
            ready: tokio::sync::Mutex::new(ready_rx),
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    /// Waits for the next connection whose handshake has completed.
    ///
    /// A connection whose handshake failed comes back as its own `Err`; calling again
    /// moves on to the next one. Once closed, returns [`Error::ListenerClosed`].
    pub async fn accept(&self) -> Result<EncryptedStream> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(Error::ListenerClosed);
        }

        tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => Err(Error::ListenerClosed),
            next = async { self.ready.lock().await.recv().await } => {
                next.unwrap_or(Err(Error::ListenerClosed))
            }
        }
    }

    /// Closes the listening socket and abandons handshakes still in flight. Pending and
    /// future accepts fail with [`Error::ListenerClosed`]. Closing twice is a no-op.
    pub fn close(&self) {
        self.closed.send_replace(true);
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
            debug!("closed listener on {}", self.local_addr);
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// The address the socket was bound to. Still answers after `close`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for ShadowListener {
    fn drop(&mut self) {
        self.close();
    }
}

async fn accept_loop(
    listener: TcpListener,
    pipeline: Arc<Pipeline>,
    ready: mpsc::Sender<Accepted>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = wait_closed(&mut closed) => return,
        };

        let connection = accepted.and_then(|(stream, peer)| {
            stream.set_nodelay(true)?;
            Ok((stream, peer))
        });
        match connection {
            Ok((stream, peer)) => {
                debug!("accepted {}", peer);
                tokio::spawn(handshake_connection(
                    stream,
                    pipeline.clone(),
                    ready.clone(),
                    closed.clone(),
                ));
            }
            Err(e) => {
                if !deliver(&ready, Err(Error::Accept(e)), &mut closed).await {
                    return;
                }
            }
        }
    }
}

async fn handshake_connection(
    stream: TcpStream,
    pipeline: Arc<Pipeline>,
    ready: mpsc::Sender<Accepted>,
    mut closed: watch::Receiver<bool>,
) {
    let established = tokio::select! {
        established = establish(stream, &pipeline) => established,
        _ = wait_closed(&mut closed) => return,
    };
    deliver(&ready, established, &mut closed).await;
}

/// Decorates (when logging is on) and runs the responder handshake.
async fn establish(stream: TcpStream, pipeline: &Pipeline) -> Accepted {
    let handshake = pipeline.handshake()?;
    pipeline.establish(Box::new(stream), handshake).await
}

/// Queues a result for `accept`. False once nobody will ever take it.
async fn deliver(
    ready: &mpsc::Sender<Accepted>,
    accepted: Accepted,
    closed: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        sent = ready.send(accepted) => sent.is_ok(),
        _ = wait_closed(closed) => false,
    }
}

async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    // A dropped sender means the listener is gone, which counts as closed.
    let _ = closed.wait_for(|closed| *closed).await;
}

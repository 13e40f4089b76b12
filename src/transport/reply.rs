//! Inbound reply server: receives protocol frames, dispatches them to a
//! handler, and answers with paired reply frames.
//!
//! The serve loop is single-task: one receive at a time matches the
//! one-at-a-time request/reply socket model. Handlers that need concurrency
//! must spawn their own tasks and still reply synchronously from the loop.

use super::{Endpoint, Stream};
use crate::error::{Result, SdkError};
use crate::protocol::{self, Frame};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Dispatch callback invoked for every decoded inbound frame.
///
/// Receives `(msg_type, req_id, body)` and produces the reply body. An `Err`
/// is logged by the serve loop and answered with an empty body.
pub type ServeHandler = Arc<dyn Fn(u32, u32, &[u8]) -> Result<Vec<u8>> + Send + Sync>;

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener, PathBuf),
}

impl Listener {
    async fn accept(&self) -> std::io::Result<Stream> {
        match self {
            Listener::Tcp(listener) => {
                listener.accept().await.map(|(stream, _)| Stream::Tcp(stream))
            }
            Listener::Unix(listener, _) => {
                listener.accept().await.map(|(stream, _)| Stream::Unix(stream))
            }
        }
    }
}

/// Server side of the request/reply pair: the socket the Agent dials to
/// deliver invocations into this process.
pub struct ReplyServer {
    address: String,
    recv_timeout: Duration,
    handler: ServeHandler,
    running: Arc<AtomicBool>,
    local_addr: Mutex<Option<String>>,
    serve_task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplyServer {
    /// Create a server for the given listen address. Nothing is bound until
    /// [`start`](Self::start).
    ///
    /// `recv_timeout` bounds each accept/receive so the serve loop polls its
    /// shutdown flag at that cadence; keep it small.
    pub fn new<F>(address: impl Into<String>, recv_timeout: Duration, handler: F) -> Self
    where
        F: Fn(u32, u32, &[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            address: address.into(),
            recv_timeout,
            handler: Arc::new(handler),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: Mutex::new(None),
            serve_task: Mutex::new(None),
        }
    }

    /// Bind the listen address and spawn the serve task. Idempotent.
    ///
    /// Fails with `Bind` when the address cannot be bound. A listen port of
    /// `0` resolves to a kernel-assigned port observable through
    /// [`local_address`](Self::local_address).
    pub async fn start(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let listener = match Endpoint::parse(&self.address)? {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(&addr).await.map_err(SdkError::Bind)?;
                let local = listener.local_addr().map_err(SdkError::Bind)?;
                *self.local_addr.lock() = Some(format!("tcp://{local}"));
                Listener::Tcp(listener)
            }
            Endpoint::Ipc(path) => {
                // only the owning server unlinks the socket path
                let _ = std::fs::remove_file(&path);
                let listener = UnixListener::bind(&path).map_err(SdkError::Bind)?;
                *self.local_addr.lock() = Some(format!("ipc://{}", path.display()));
                Listener::Unix(listener, path)
            }
        };

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let handler = self.handler.clone();
        let recv_timeout = self.recv_timeout;
        let task = tokio::spawn(serve_loop(listener, running, handler, recv_timeout));
        *self.serve_task.lock() = Some(task);

        info!(
            "reply server listening on {}",
            self.local_address().unwrap_or_default()
        );
        Ok(())
    }

    /// Stop the serve loop and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let task = self.serve_task.lock().take();
        if let Some(task) = task {
            if task.await.is_err() {
                warn!("reply serve task terminated abnormally");
            }
            debug!("reply server on {} stopped", self.address);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolved listen address, available once started
    pub fn local_address(&self) -> Option<String> {
        self.local_addr.lock().clone()
    }
}

async fn serve_loop(
    listener: Listener,
    running: Arc<AtomicBool>,
    handler: ServeHandler,
    recv_timeout: Duration,
) {
    let mut peer: Option<Stream> = None;

    while running.load(Ordering::SeqCst) {
        if peer.is_none() {
            match timeout(recv_timeout, listener.accept()).await {
                Ok(Ok(stream)) => {
                    debug!("reply server accepted a peer");
                    peer = Some(stream);
                }
                Ok(Err(e)) => warn!("accept failed: {e}"),
                // timeout doubles as the shutdown poll
                Err(_) => {}
            }
            continue;
        }

        let Some(stream) = peer.as_mut() else { continue };

        let raw = match timeout(recv_timeout, stream.read_frame()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(SdkError::Io(e))) => {
                debug!("peer went away: {e}");
                peer = None;
                continue;
            }
            Ok(Err(e)) => {
                warn!("receive failed: {e}");
                peer = None;
                continue;
            }
            Err(_) => continue,
        };

        let (reply_type, req_id, reply_body) = match Frame::decode(&raw) {
            Ok(frame) => {
                let body = match handler(frame.msg_id, frame.req_id, &frame.body) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(
                            "handler for {} (req {}) failed: {e}",
                            protocol::name_of(frame.msg_id),
                            frame.req_id
                        );
                        Vec::new()
                    }
                };
                (protocol::response_for(frame.msg_id), frame.req_id, body)
            }
            Err(e) => {
                // a request/reply peer is owed a reply even for garbage
                warn!("dropping malformed frame: {e}");
                (protocol::MSG_MALFORMED_RESPONSE, 0, Vec::new())
            }
        };

        match Frame::encode(reply_type, req_id, &reply_body) {
            Ok(frame) => {
                if let Err(e) = stream.write_frame(&frame).await {
                    warn!("failed to send reply: {e}");
                    peer = None;
                }
            }
            Err(e) => warn!("failed to encode reply: {e}"),
        }
    }

    if let Listener::Unix(_, path) = &listener {
        let _ = std::fs::remove_file(path);
    }
    debug!("reply serve loop exited");
}

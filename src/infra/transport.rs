use super::wire::{TransportEvent, TransportOp, decode_event, encode_op};
use futures_util::{SinkExt as _, StreamExt as _};
use rand_core::OsRng;
use rand_core::RngCore as _;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{debug, info, warn};
use url::Url;

/// Ops queued while the socket is down; the oldest are dropped beyond this.
pub const OUTBOX_CAPACITY: usize = 256;

const PING_EVERY: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BACKOFF_START_MS: u64 = 250;
const BACKOFF_MAX_MS: u64 = 30_000;
/// A session must stay up this long before the reconnect backoff starts over.
const STABLE_SESSION: Duration = Duration::from_secs(10);

/// Duplex channel the chat view pushes operations into. Delivery is never reported back.
pub trait ChatTransport {
    fn send(&self, op: TransportOp);
    fn is_ready(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid websocket url: {0}")]
    Url(String),

    #[error("failed to build tokio runtime: {0}")]
    Runtime(String),

    #[error("failed to spawn transport thread: {0}")]
    Spawn(std::io::Error),
}

#[derive(Debug, Error)]
enum SessionError {
    #[error("websocket connect failed: {0}")]
    Connect(String),

    #[error("websocket error: {0}")]
    Ws(String),

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

enum SessionEnd {
    Shutdown,
    Closed,
}

#[derive(Clone, Debug)]
pub struct WsOptions {
    pub url: Url,
    pub token: Option<String>,
}

/// WebSocket transport running on its own thread with a private tokio runtime.
///
/// `send` never blocks: ops go through an unbounded channel into the socket task, which keeps
/// a bounded outbox while disconnected and flushes it after reconnecting.
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<TransportOp>,
    ready: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn start(
        options: WsOptions,
        events: Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        match options.url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(TransportError::Url(format!(
                    "expected ws:// or wss://, got {other}://"
                )));
            }
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|error| TransportError::Runtime(error.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<TransportOp>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ready = Arc::new(AtomicBool::new(false));

        let thread = std::thread::Builder::new()
            .name("cardchat-transport".to_string())
            .spawn({
                let ready = ready.clone();
                move || {
                    runtime.block_on(run_socket_loop(
                        options,
                        outbound_rx,
                        events,
                        ready,
                        shutdown_rx,
                    ));
                }
            })
            .map_err(TransportError::Spawn)?;

        Ok(Self {
            outbound: outbound_tx,
            ready,
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }

    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

impl ChatTransport for WsTransport {
    fn send(&self, op: TransportOp) {
        if !self.is_ready() {
            debug!(op = op.type_name(), "transport not ready; op queued for reconnect");
        }
        if let Err(error) = self.outbound.send(op) {
            warn!(op = error.0.type_name(), "transport task is gone; op dropped");
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// Bounded FIFO of ops waiting for a live socket.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<TransportOp>,
    dropped: usize,
}

impl Outbox {
    pub fn push_back(&mut self, op: TransportOp) {
        if self.queue.len() >= OUTBOX_CAPACITY {
            if let Some(oldest) = self.queue.pop_front() {
                self.dropped += 1;
                warn!(op = oldest.type_name(), "outbox full; dropping oldest op");
            }
        }
        self.queue.push_back(op);
    }

    pub fn push_front(&mut self, op: TransportOp) {
        self.queue.push_front(op);
        if self.queue.len() > OUTBOX_CAPACITY {
            if let Some(newest) = self.queue.pop_back() {
                self.dropped += 1;
                warn!(op = newest.type_name(), "outbox full; dropping newest op");
            }
        }
    }

    pub fn pop_front(&mut self) -> Option<TransportOp> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_socket_loop(
    options: WsOptions,
    mut outbound_rx: mpsc::UnboundedReceiver<TransportOp>,
    events: Sender<TransportEvent>,
    ready: Arc<AtomicBool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut outbox = Outbox::default();
    let mut backoff_ms = BACKOFF_START_MS;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let mut connected_at = None;
        let run = connect_and_run_once(
            &options,
            &mut outbound_rx,
            &mut outbox,
            &events,
            &ready,
            shutdown_rx.clone(),
            &mut connected_at,
        )
        .await;
        ready.store(false, Ordering::Release);
        if session_was_stable(connected_at, Instant::now()) {
            backoff_ms = BACKOFF_START_MS;
        }

        let reason = match run {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Closed) => "closed by server".to_string(),
            Err(error) => {
                warn!(%error, url = %options.url, "chat transport session failed");
                error.to_string()
            }
        };
        if events.send(TransportEvent::Disconnected { reason }).is_err() {
            break;
        }

        let sleep_ms = backoff_ms.saturating_add(jitter_ms(backoff_ms / 4));
        let sleep = tokio::time::sleep(Duration::from_millis(sleep_ms));
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                op = outbound_rx.recv() => {
                    match op {
                        Some(op) => outbox.push_back(op),
                        None => return,
                    }
                }
                _ = &mut sleep => break,
            }
        }
        backoff_ms = next_backoff(backoff_ms);
    }
}

/// Sessions the server drops right after the handshake do not count as recovered.
fn session_was_stable(connected_at: Option<Instant>, now: Instant) -> bool {
    connected_at.is_some_and(|at| now.saturating_duration_since(at) >= STABLE_SESSION)
}

fn next_backoff(current_ms: u64) -> u64 {
    current_ms.saturating_mul(2).min(BACKOFF_MAX_MS)
}

async fn connect_and_run_once(
    options: &WsOptions,
    outbound_rx: &mut mpsc::UnboundedReceiver<TransportOp>,
    outbox: &mut Outbox,
    events: &Sender<TransportEvent>,
    ready: &AtomicBool,
    mut shutdown_rx: watch::Receiver<bool>,
    connected_at: &mut Option<Instant>,
) -> Result<SessionEnd, SessionError> {
    let mut request = options
        .url
        .as_str()
        .into_client_request()
        .map_err(|error| SessionError::Connect(error.to_string()))?;
    if let Some(token) = options.token.as_deref() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|error| SessionError::Connect(error.to_string()))?;
        request.headers_mut().insert("Authorization", value);
    }

    let (mut ws, _response) =
        tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| SessionError::Connect("timed out".to_string()))?
            .map_err(|error| SessionError::Connect(error.to_string()))?;

    info!(url = %options.url, "chat transport connected");
    *connected_at = Some(Instant::now());
    ready.store(true, Ordering::Release);
    let _ = events.send(TransportEvent::Connected);

    if !outbox.is_empty() {
        info!(queued = outbox.len(), dropped = outbox.dropped(), "flushing queued ops");
    }
    while let Some(op) = outbox.pop_front() {
        if let Err(error) = send_op(&mut ws, &op).await {
            outbox.push_front(op);
            return Err(error);
        }
    }

    let mut ping_interval = tokio::time::interval(PING_EVERY);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = ws.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
            _ = ping_interval.tick() => {
                ws.send(Message::Ping(Vec::new().into()))
                    .await
                    .map_err(|error| SessionError::Ws(error.to_string()))?;
            }
            op = outbound_rx.recv() => {
                let Some(op) = op else {
                    let _ = ws.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                };
                if let Err(error) = send_op(&mut ws, &op).await {
                    outbox.push_front(op);
                    return Err(error);
                }
            }
            msg = ws.next() => {
                let Some(msg) = msg else {
                    return Ok(SessionEnd::Closed);
                };
                let msg = msg.map_err(|error| SessionError::Ws(error.to_string()))?;
                match msg {
                    Message::Ping(bytes) => {
                        ws.send(Message::Pong(bytes))
                            .await
                            .map_err(|error| SessionError::Ws(error.to_string()))?;
                    }
                    Message::Text(text) => match decode_event(&text) {
                        Ok(event) => {
                            if events.send(event).is_err() {
                                let _ = ws.send(Message::Close(None)).await;
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        Err(error) => debug!(%error, "ignoring inbound frame"),
                    },
                    Message::Close(_) => return Ok(SessionEnd::Closed),
                    _ => {}
                }
            }
        }
    }
}

async fn send_op(ws: &mut WsStream, op: &TransportOp) -> Result<(), SessionError> {
    let text = encode_op(op)?;
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|error| SessionError::Ws(error.to_string()))
}

fn jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut buf = [0u8; 8];
    OsRng.fill_bytes(&mut buf);
    u64::from_le_bytes(buf) % (max_ms + 1)
}
